// Native Metronome - Rust Audio Engine
// Drift-free beat clock, click synthesis and low-latency output

// Module declarations
pub mod api;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod managers;
pub mod telemetry;

// Re-exports for convenience
pub use api::*;

use std::sync::Once;

static LOGGING: Once = Once::new();

/// Install the global tracing subscriber. Safe to call repeatedly.
///
/// `log` records are forwarded into tracing, so both macro families end up
/// in the same sink: logcat on Android, stderr elsewhere.
pub fn init_logging() {
    LOGGING.call_once(|| {
        cfg_if::cfg_if! {
            if #[cfg(target_os = "android")] {
                use tracing_subscriber::prelude::*;

                match tracing_android::layer("NativeMetronome") {
                    Ok(layer) => {
                        let _ = tracing_subscriber::registry().with(layer).try_init();
                    }
                    Err(err) => eprintln!("failed to create android log layer: {}", err),
                }
            } else {
                let _ = tracing_subscriber::fmt()
                    .with_max_level(tracing::Level::INFO)
                    .with_target(false)
                    .try_init();
            }
        }
    });
}

/// JNI_OnLoad is called when the native library is loaded by Android
/// This function initializes the Android context required by oboe-rs
#[cfg(target_os = "android")]
#[no_mangle]
pub extern "system" fn JNI_OnLoad(
    vm: jni::JavaVM,
    _reserved: *mut std::ffi::c_void,
) -> jni::sys::jint {
    init_logging();
    log::info!("JNI_OnLoad called - initializing Android context");

    // SAFETY: called once by the runtime before any Oboe stream is opened,
    // and the JavaVM pointer stays valid for the life of the process.
    unsafe {
        ndk_context::initialize_android_context(
            vm.get_java_vm_pointer().cast(),
            std::ptr::null_mut(),
        );
    }

    telemetry::hub().record_lifecycle(telemetry::LifecyclePhase::LibraryLoaded);
    log::info!("Android context initialized successfully");

    jni::sys::JNI_VERSION_1_6
}
