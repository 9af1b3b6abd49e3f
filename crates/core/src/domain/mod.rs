pub mod contact;
pub mod grant;
pub mod recipient;
pub mod scope;
pub mod ticket;
