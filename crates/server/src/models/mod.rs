//! Domain models for Atelier.
//!
//! Domain types (`User`, `Customer`, `Order`) are what the services work with;
//! the `*Request`, `*Draft` and `*Patch` types are request bodies, and the
//! `*Filter` types are the store-level query criteria.

pub mod customer;
pub mod order;
pub mod user;

pub use customer::{Customer, CustomerFilter, CustomerProfile, CustomerSummary, NewCustomer};
pub use order::{
    CreatorSummary, NewOrder, Order, OrderDates, OrderDetails, OrderDraft, OrderFilter, OrderKey,
    OrderPatch, OrderQuery, StatusChange, ValidOrder,
};
pub use user::{
    AccessChangeRequest, CreateUserRequest, LoginRequest, LoginResponse, NewUser,
    PasswordResetRequest, UpdateUserRequest, User, UserFilter, UserProfile, UserView,
};
