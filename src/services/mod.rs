pub mod accounts;
pub mod broadcast;
pub mod checkin;
pub mod invitations;
