//! Progress lines written to the caller's output stream.

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// `---- msg ----`
pub fn section(msg: &str) -> String {
    format!("---- {msg} ----\n")
}

/// ` ---> msg`
pub fn action(msg: &str) -> String {
    format!(" ---> {msg}\n")
}

pub async fn write_section<W>(w: &mut W, msg: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    w.write_all(section(msg).as_bytes()).await
}

pub async fn write_action<W>(w: &mut W, msg: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    w.write_all(action(msg).as_bytes()).await
}

/// `msg` as-is, newline terminated.
pub async fn write_line<W>(w: &mut W, msg: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    w.write_all(msg.as_bytes()).await?;
    w.write_all(b"\n").await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn formats() {
        let mut out = Vec::new();
        write_section(&mut out, "Starting build").await.unwrap();
        write_action(&mut out, "Destination image: a:v1").await.unwrap();
        write_line(&mut out, "healthcheck:\n  path: /").await.unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "---- Starting build ----\n ---> Destination image: a:v1\nhealthcheck:\n  path: /\n"
        );
    }
}
