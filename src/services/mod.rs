pub mod chatroom_service;
pub mod message_service;
pub mod reclamation;

pub use chatroom_service::ChatroomService;
pub use message_service::MessageService;
