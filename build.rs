fn main() {
    // Re-run if the schemas change.
    println!("cargo:rerun-if-changed=proto");

    // protox parses the schemas in-process, so no system protoc is needed.
    let descriptors = protox::compile(["gateway.proto", "lospan.proto"], ["proto"])
        .expect("failed to parse proto files");

    tonic_build::configure()
        .build_server(false)
        .compile_fds(descriptors)
        .expect("failed to generate gRPC code");
}
