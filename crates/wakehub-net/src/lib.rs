// # wakehub-net
//
// Concrete network capabilities for the wakehub services.
//
// | Type | Capability |
// |---|---|
// | [`UdpWakeSender`] | `WakeSender`: magic packet broadcast on UDP 9 and 7 |
// | [`TcpHostProber`] | `HostProber`: bounded TCP connect |
// | [`ReqwestHttpClient`] | `HttpClient`: GET with per-call timeout and redirects |
// | [`InterfaceLinkMonitor`] | `LinkMonitor`: any routable interface is up |
// | [`FileFirmwareUpdater`] | `FirmwareUpdater`: streamed download into a staging file |

pub mod firmware;
pub mod http;
pub mod link;
pub mod probe;
pub mod wake;

pub use firmware::{FileFirmwareUpdater, StagingFile};
pub use http::ReqwestHttpClient;
pub use link::InterfaceLinkMonitor;
pub use probe::TcpHostProber;
pub use wake::UdpWakeSender;
