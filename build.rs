fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Host builds (library + tests) carry no ESP-IDF toolchain.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
