pub mod customer;
pub mod notification_settings;
pub mod order;
pub mod order_item;
pub mod product;
pub mod user;
