pub mod base;
pub mod eventbrite;
pub mod ics;
pub mod ticketmaster;
