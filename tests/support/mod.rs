pub mod scripted;
pub mod socket_guard;
