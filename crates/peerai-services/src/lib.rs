pub mod broker;
pub mod matchmaker;
pub mod presence;
pub mod registry;
pub mod relay;
pub mod reservation;

pub use broker::{Broker, BrokerCommand, BrokerError, BrokerHandle, BrokerStatus};
pub use matchmaker::{find_helper, select_helper};
pub use presence::{Outbound, Presence};
pub use registry::Registry;
pub use relay::{relay, Delivery};
pub use reservation::{Reservation, ReservationLedger};
