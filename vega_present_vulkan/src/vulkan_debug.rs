/// Validation layer debug messenger, routed into the vega logging system.
///
/// Only compiled with the `vulkan-validation` feature.
use ash::vk;
use std::ffi::CStr;

use vega_present::{vega_debug, vega_error, vega_warn};

const SOURCE: &str = "vega::vulkan::validation";

/// Vulkan debug messenger callback
///
/// Called by the validation layers when they detect issues; messages are
/// forwarded to the installed vega logger at a matching severity.
pub unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let callback_data = *p_callback_data;
    let message = if callback_data.p_message.is_null() {
        "No message"
    } else {
        CStr::from_ptr(callback_data.p_message)
            .to_str()
            .unwrap_or("Invalid UTF-8")
    };

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        vega_error!(SOURCE, "{}", message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        vega_warn!(SOURCE, "{}", message);
    } else {
        vega_debug!(SOURCE, "{}", message);
    }

    vk::FALSE
}
