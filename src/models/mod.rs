mod customer;
mod role;

pub use customer::{sortable_name, Customer, CustomerFields, RawCustomer};
pub use role::Role;
