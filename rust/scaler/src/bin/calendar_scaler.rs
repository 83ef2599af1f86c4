use calendar_scaler::entrypoint;

#[tokio::main]
async fn main() {
    Box::pin(entrypoint()).await;
}
