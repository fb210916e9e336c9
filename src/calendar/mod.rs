mod item;
mod remote;

pub mod caldav;
pub mod event;
pub mod extract;

#[cfg(test)]
pub mod mock;

pub use caldav::{Client as CaldavClient, Credentials};
pub use item::*;
pub use remote::*;
