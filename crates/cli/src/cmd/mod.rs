mod clean;
mod install;
mod paths;

pub use clean::cmd_clean;
pub use install::{ExtensionArgs, InstallArgs, cmd_install};
pub use paths::cmd_paths;

/// Map a pipeline return code onto a process exit status.
///
/// `0` stays `0`, a failed stage (negative) becomes `255`, failing check
/// counts clamp to `1..=254`.
pub fn exit_status(return_code: i32) -> u8 {
  match return_code {
    0 => 0,
    code if code < 0 => 255,
    code => code.clamp(1, 254) as u8,
  }
}
