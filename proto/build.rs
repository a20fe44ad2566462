use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    // Generated code is committed under src/generated/; regeneration needs
    // protoc and is opt-in.
    if std::env::var("GENERATE_PROTO").is_err() {
        return Ok(());
    }
    tonic_build::configure()
        .out_dir("src/generated/")
        .build_client(true)
        .build_server(true)
        .compile_protos(&["metaserver.proto", "datanode.proto"], &["."])?;
    Ok(())
}
