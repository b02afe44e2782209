use std::io::Result;

fn main() -> Result<()> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path().unwrap());
    }

    let proto_files = [
        "civica/v1/auth.proto",
        "civica/v1/levels.proto",
        "civica/v1/challenges.proto",
        "civica/v1/features.proto",
        "civica/v1/commercial.proto",
        "civica/v1/notifications.proto",
    ];

    tonic_build::configure().compile_protos(&proto_files, &["."])?;

    for proto in &proto_files {
        println!("cargo:rerun-if-changed={}", proto);
    }

    Ok(())
}
