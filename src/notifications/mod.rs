/// Member notification settings: registered devices and opt-outs
pub mod devices;
pub mod preferences;

pub use devices::{ActiveToken, DeviceTokenManager, Platform};
pub use preferences::{
    MemberPreferences, NotificationPreferences, PreferencesManager, PreferencesPatch,
};
