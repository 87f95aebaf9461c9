fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/build.proto");
    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .btree_map(["."])
        .compile_protos(&["proto/build.proto"], &["proto"])?;
    Ok(())
}
