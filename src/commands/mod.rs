pub mod control;
pub mod publish;
pub mod serve;
pub mod top;
