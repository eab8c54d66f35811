pub mod api;
pub mod deepseek;
pub mod openai;

pub use deepseek::Deepseek;
pub use openai::OpenAI;
