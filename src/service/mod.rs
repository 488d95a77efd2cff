pub mod calendar_service;
pub mod dispatcher;
pub mod routing;
