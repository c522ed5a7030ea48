// Highlight capture and sync
//
// page/       - selection tracking and the highlight popup (runs against a PageSurface)
// background/ - message router, API delivery, screenshots and the offline queue
// host/       - daemon paths, socket server and client

pub mod background;
pub mod clock;
pub mod error;
pub mod host;
pub mod models;
pub mod page;

// Async polling helpers shared by unit and integration tests
pub mod test_utils;
