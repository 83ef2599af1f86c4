fn main() -> Result<(), Box<dyn std::error::Error>> {
    // KEDA's external scaler contract. Keep in sync with
    // https://github.com/kedacore/keda/blob/main/pkg/scalers/externalscaler/externalscaler.proto
    tonic_prost_build::configure()
        .emit_rerun_if_changed(true)
        .build_client(true)
        .build_server(true)
        .compile_protos(&["idl/externalscaler.proto"], &["idl/"])?;

    Ok(())
}
