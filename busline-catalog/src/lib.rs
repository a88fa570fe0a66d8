pub mod buses;
pub mod routes;

pub use buses::{BusSearch, BusService};
pub use routes::RouteService;
