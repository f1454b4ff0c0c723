//! Chat with the language model behind the avatar

mod log;
mod session;
mod stream;

pub use log::{ChatLog, Message, Role};
pub use session::{ChatSession, DEFAULT_SYSTEM_PROMPT, INTRODUCTION};
pub use stream::{ChatBackend, ChatStream, OpenAiChat, SseDecoder, SseEvent, parse_sse_line};
