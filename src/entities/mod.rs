//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod meal_token;
pub mod member;
pub mod price_quote;
pub mod subscription;
pub mod transaction;

// Re-export specific types to avoid conflicts
pub use meal_token::{
    Column as MealTokenColumn, Entity as MealToken, MealSlot, Model as MealTokenModel, TokenStatus,
};
pub use member::{Column as MemberColumn, Entity as Member, Model as MemberModel};
pub use price_quote::{Column as PriceQuoteColumn, Entity as PriceQuote, Model as PriceQuoteModel};
pub use subscription::{
    Column as SubscriptionColumn, Entity as Subscription, Model as SubscriptionModel,
};
pub use transaction::{
    Column as TransactionColumn, Entity as Transaction, Model as TransactionModel, TxnKind,
};
