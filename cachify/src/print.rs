use shared::Result;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::domain::{CachedPage, PrintOutcome};
use crate::signature::Signature;

/// Writes a cache hit to the response stream.
///
/// Structured pages get a signature rendered now, a brief one when their metadata is
/// missing; flat pages already carry theirs. Missing or empty pages write nothing.
pub async fn emit_page<W>(
    entry: Option<&CachedPage>,
    signature: &Signature,
    sig_detail: bool,
    out: &mut W,
) -> Result<PrintOutcome>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let page = match entry {
        Some(page) if page.is_well_formed() => page,
        _ => return Ok(PrintOutcome::PassThrough),
    };

    out.write_all(page.data().as_bytes()).await?;
    if let CachedPage::Structured { meta, .. } = page {
        out.write_all(signature.render(sig_detail, meta.as_ref()).as_bytes())
            .await?;
    }
    out.flush().await?;

    Ok(PrintOutcome::Served)
}
