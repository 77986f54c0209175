fn main() {
    // Register rustc cfg for selecting the native file-API shared object name.
    println!("cargo::rustc-check-cfg=cfg(padll_native_lib, values(\"libc-so\", \"libsystem\"))");

    let target_os =
        std::env::var("CARGO_CFG_TARGET_OS").expect("CARGO_CFG_TARGET_OS should be set");

    match target_os.as_str() {
        "macos" => println!("cargo::rustc-cfg=padll_native_lib=\"libsystem\""),
        _ => println!("cargo::rustc-cfg=padll_native_lib=\"libc-so\""),
    }
}
