pub mod cat;
pub mod exists;
pub mod ln;
pub mod ls;
pub mod mv;
pub mod publish;
pub mod put;
pub mod readlink;
pub mod rm;
pub mod rmdir;
pub mod version;

pub use cat::Cat;
pub use exists::Exists;
pub use ln::Ln;
pub use ls::Ls;
pub use mv::Mv;
pub use publish::Publish;
pub use put::Put;
pub use readlink::Readlink;
pub use rm::Rm;
pub use rmdir::Rmdir;
pub use version::Version;
