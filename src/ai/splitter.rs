/// Blocks of `text` separated by `delimiter`, trimmed, with empty blocks
/// dropped. Lazy and order-preserving.
///
/// An empty delimiter means the whole text is a single block.
pub fn split_blocks<'a>(
    text: &'a str,
    delimiter: &'a str,
) -> Box<dyn Iterator<Item = &'a str> + 'a> {
    if delimiter.is_empty() {
        return Box::new(std::iter::once(text.trim()).filter(|block| !block.is_empty()));
    }
    Box::new(
        text.split(delimiter)
            .map(str::trim)
            .filter(|block| !block.is_empty()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_trims_and_drops_empty_blocks() {
        let blocks: Vec<_> = split_blocks("  A  ---B--- \n\n ---  ", "---").collect();
        assert_eq!(blocks, vec!["A", "B"]);
    }

    #[test]
    fn keeps_original_order() {
        let text = "first post\n---\nsecond post\n---\nthird post\n";
        let blocks: Vec<_> = split_blocks(text, "---").collect();
        assert_eq!(blocks, vec!["first post", "second post", "third post"]);
    }

    #[test]
    fn blank_output_yields_nothing() {
        assert_eq!(split_blocks("", "---").count(), 0);
        assert_eq!(split_blocks(" \n --- \n--- ", "---").count(), 0);
    }

    #[test]
    fn text_without_delimiter_is_one_block() {
        let blocks: Vec<_> = split_blocks("  just one  ", "---").collect();
        assert_eq!(blocks, vec!["just one"]);
        let blocks: Vec<_> = split_blocks(" a --- b ", "").collect();
        assert_eq!(blocks, vec!["a --- b"]);
    }

    #[test]
    fn multiline_blocks_keep_inner_whitespace() {
        let blocks: Vec<_> = split_blocks("line one\n\nline two\n~~~\nnext", "~~~").collect();
        assert_eq!(blocks, vec!["line one\n\nline two", "next"]);
    }
}
