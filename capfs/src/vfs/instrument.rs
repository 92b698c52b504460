//! Shared wrapper run around every `CapFs` operation.

use crate::error::{BoxError, FsError, FsResult};
use std::fmt::Debug;
use std::future::Future;
use tracing::{debug, warn};

/// Awaits `fut`, normalising its error into `FsError`. With `trace` on, the
/// call, its result and any failure are logged.
pub async fn invoke<T, Fut>(trace: bool, op: &'static str, args: &dyn Debug, fut: Fut) -> FsResult<T>
where
    T: Debug,
    Fut: Future<Output = Result<T, BoxError>>,
{
    if trace {
        debug!(op, args = ?args, "call");
    }
    match fut.await {
        Ok(value) => {
            if trace {
                debug!(op, result = ?value, "return");
            }
            Ok(value)
        }
        Err(e) => {
            let err = FsError::normalize(e);
            if trace {
                warn!(op, args = ?args, code = %err.code(), error = %err, "failed");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Errno;
    use crate::host::HostError;

    #[tokio::test]
    async fn test_passes_values_through() {
        let out = invoke(true, "noop", &"/a", async { Ok::<_, BoxError>(7u32) }).await;
        assert_eq!(out.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_wraps_foreign_errors_as_unknown() {
        let out: FsResult<()> = invoke(false, "op", &(), async {
            Err(HostError::InvalidState("closed".into()).into())
        })
        .await;
        assert_eq!(out.unwrap_err().code(), Errno::Unknown);

        let out: FsResult<()> =
            invoke(false, "op", &(), async { Err(FsError::not_supported("readlink").into()) }).await;
        assert_eq!(out.unwrap_err().code(), Errno::Enotsup);
    }
}
