pub mod media;
pub mod openai;

pub use openai::OpenAiClient;
