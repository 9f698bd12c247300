/// Single-page upload UI served at `GET /ui`.
///
/// The page posts the chosen file to `/segment/` as multipart field `file`,
/// shows the original next to the colorized result, and surfaces the
/// server's `detail` message when segmentation is refused.
pub const INDEX_HTML: &str = include_str!("ui/index.html");
