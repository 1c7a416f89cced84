//! Database entities.

pub mod admin_profile;
pub mod business;
pub mod device_token;
pub mod dining_table;
pub mod ip_block;
pub mod table_silence;
pub mod user;
pub mod waiter_call;
pub mod waiter_profile;

pub use admin_profile::Entity as AdminProfile;
pub use business::Entity as Business;
pub use device_token::Entity as DeviceToken;
pub use dining_table::Entity as DiningTable;
pub use ip_block::Entity as IpBlock;
pub use table_silence::Entity as TableSilence;
pub use user::Entity as User;
pub use waiter_call::Entity as WaiterCall;
pub use waiter_profile::Entity as WaiterProfile;
