pub mod calendar;
pub mod call;
