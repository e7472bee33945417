//! Reference tool implementations (C3 consumers): an `echo` tool matching
//! spec §8 scenario 2 exactly, and a simplified foreground-only shell exec
//! tool grounded on `sa_tools::exec`.

pub mod echo;
pub mod shell_exec;

pub use echo::EchoTool;
pub use shell_exec::ShellExecTool;
