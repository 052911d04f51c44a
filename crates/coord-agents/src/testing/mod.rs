mod stub_agent;

pub use stub_agent::{StubAgent, StubKind};
