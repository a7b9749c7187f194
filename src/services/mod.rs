pub mod cart_clearer;
pub mod cart_snapshot;
pub mod order_state_machine;
pub mod orders;
pub mod payments;

pub use cart_clearer::CartClearer;
pub use cart_snapshot::CartSnapshotter;
pub use order_state_machine::{Actor, Command, OrderStateMachine, Transition};
pub use orders::{NewOrder, OrderService};
pub use payments::{PaymentAdapters, PaymentProof, PaymentService};
