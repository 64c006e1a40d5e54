/// Member-facing content: prayers, announcements and devotionals
///
/// Prayers and announcements are indexed for search by triggers and can be
/// hidden by moderation; every listing here leaves hidden rows out.
pub mod announcements;
pub mod devotionals;
pub mod prayers;

pub use announcements::{Announcement, AnnouncementStore, NewAnnouncement};
pub use devotionals::{Devotional, DevotionalStore, NewDevotional};
pub use prayers::{NewPrayer, Prayer, PrayerDetail, PrayerReaction, PrayerStore};
