pub mod elevenlabs;
pub mod plan_llm;
pub mod tts;

pub use elevenlabs::ElevenLabsTtsAdapter;
pub use plan_llm::OpenAiPlanAdapter;
pub use tts::OpenAiTtsAdapter;
