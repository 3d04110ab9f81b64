/// Optional delegates for the `clipboard`, `notifications`, and
/// `automation` guest capabilities (spec §4.3). Without a configured
/// adapter, a permitted call still fails with a `secure_api_unavailable`
/// guest-visible error — the capability was authorized but there is
/// nothing on the host side to perform it.
pub trait ClipboardAdapter: Send + Sync {
    fn read(&self) -> Option<String>;
    fn write(&self, text: &str);
}

pub trait NotificationsAdapter: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

pub trait AutomationAdapter: Send + Sync {
    fn invoke(&self, action: &str, params: serde_json::Value) -> serde_json::Value;
}

#[derive(Default)]
pub struct SandboxAdapters {
    pub clipboard: Option<Box<dyn ClipboardAdapter>>,
    pub notifications: Option<Box<dyn NotificationsAdapter>>,
    pub automation: Option<Box<dyn AutomationAdapter>>,
}
