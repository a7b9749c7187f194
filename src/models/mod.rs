pub mod book;
pub mod cart;
pub mod money;
pub mod order;

pub use book::Book;
pub use cart::{Cart, CartItem};
pub use order::{Order, OrderDraft, OrderItem, OrderStatus, PaymentInfo, PaymentMethod};
