pub mod cpal_host;
pub mod host;
pub mod manual;
pub mod negotiation;
