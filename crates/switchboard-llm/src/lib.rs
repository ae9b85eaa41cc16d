pub mod mock;
pub mod openai;
pub mod sse;

pub use mock::{MockChatModel, MockReply};
pub use openai::{OpenAiChatModel, OpenAiConfig};
