//! Input monitoring permission probe

/// Whether this process may intercept keyboard events system-wide
///
/// With `prompt_if_needed`, macOS shows its permission dialog when the
/// permission is missing. The answer is not polled afterwards; a fresh
/// check happens on the next launch.
#[cfg(target_os = "macos")]
pub fn has_input_monitoring_permission(prompt_if_needed: bool) -> bool {
    use core_foundation::base::TCFType;
    use core_foundation::boolean::CFBoolean;
    use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
    use core_foundation::string::{CFString, CFStringRef};

    #[link(name = "ApplicationServices", kind = "framework")]
    extern "C" {
        static kAXTrustedCheckOptionPrompt: CFStringRef;
        fn AXIsProcessTrustedWithOptions(options: CFDictionaryRef) -> bool;
    }

    let key = unsafe { CFString::wrap_under_get_rule(kAXTrustedCheckOptionPrompt) };
    let value = if prompt_if_needed {
        CFBoolean::true_value()
    } else {
        CFBoolean::false_value()
    };
    let options = CFDictionary::from_CFType_pairs(&[(key.as_CFType(), value.as_CFType())]);

    unsafe { AXIsProcessTrustedWithOptions(options.as_concrete_TypeRef()) }
}

#[cfg(not(target_os = "macos"))]
pub fn has_input_monitoring_permission(_prompt_if_needed: bool) -> bool {
    false
}
