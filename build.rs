// Build script for the native metronome library
//
// Dart bindings are produced out of band with
//   flutter_rust_bridge_codegen generate
// so this script only handles platform link flags.

fn main() {
    println!("cargo:rerun-if-changed=src/api.rs");

    // Oboe is C++; Android builds must link libc++_shared so symbols like
    // __cxa_pure_virtual resolve on every ABI.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("android") {
        println!("cargo:rustc-link-lib=c++_shared");
    }
}
