pub mod bitget;

pub use bitget::{BitgetClient, Credentials};
