pub mod event;
pub mod flash_sale;
pub mod order;
pub mod organizer;
pub mod payment;
pub mod ticket;
pub mod user;

pub use event::Event;
pub use flash_sale::FlashSale;
pub use order::{Order, OrderItem, OrderStatus};
pub use organizer::Organizer;
pub use payment::Payment;
pub use ticket::{TicketPurchase, TicketStatus, TicketTier};
pub use user::User;
