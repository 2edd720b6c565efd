pub mod message;
pub mod notification;

pub use message::{Conversation, Message, ADMIN_DISPLAY_NAME, ADMIN_USER_ID};
pub use notification::{PushNotification, PAGE_MESSAGE, PAGE_POST};
