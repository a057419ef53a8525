//! Fold tagged paragraphs into named sections and render tables as markdown.

use distill_shared::{NamedTextBlock, ParagraphRole, RawParagraph, TITLE_BLOCK};

use crate::layout::LayoutTable;

/// Name of the block body text lands in before any heading is seen.
pub const LEADING_BLOCK: &str = "Abstract";

/// Group paragraphs into sections, in first-encounter order.
///
/// A heading switches the running block (creating it, or resuming it when
/// the same heading text appeared before). A title paragraph switches to the
/// reserved title block and is appended with a single newline; body text,
/// footnotes and formulas are appended to the running block followed by a
/// blank line. Noise and unrecognized roles are dropped.
pub fn group_sections(paragraphs: &[RawParagraph]) -> Vec<NamedTextBlock> {
    let mut blocks: Vec<NamedTextBlock> = Vec::new();
    let mut current = LEADING_BLOCK.to_string();

    for para in paragraphs {
        match para.role {
            Some(role) if role.is_noise() => {}
            Some(ParagraphRole::Unrecognized) => {}
            Some(ParagraphRole::SectionHeading) => {
                current = para.content.trim().to_string();
                block_mut(&mut blocks, &current);
            }
            Some(ParagraphRole::Title) => {
                current = TITLE_BLOCK.to_string();
                let block = block_mut(&mut blocks, &current);
                block.text.push_str(&para.content);
                block.text.push('\n');
            }
            _ => {
                let block = block_mut(&mut blocks, &current);
                block.text.push_str(&para.content);
                block.text.push_str("\n\n");
            }
        }
    }

    blocks
}

fn block_mut<'a>(blocks: &'a mut Vec<NamedTextBlock>, name: &str) -> &'a mut NamedTextBlock {
    let idx = match blocks.iter().position(|b| b.name == name) {
        Some(idx) => idx,
        None => {
            blocks.push(NamedTextBlock::new(name, String::new()));
            blocks.len() - 1
        }
    };
    &mut blocks[idx]
}

/// Render a table as a markdown grid.
///
/// A spanning cell's text is placed at its top-left position and the
/// positions it covers stay blank. The first row is treated as the header.
pub fn table_to_markdown(table: &LayoutTable) -> String {
    let rows = table.row_count;
    let cols = table.column_count;
    if rows == 0 || cols == 0 {
        return String::new();
    }

    let mut grid = vec![vec![String::new(); cols]; rows];
    for cell in &table.cells {
        if cell.row_index >= rows || cell.column_index >= cols {
            continue;
        }
        let content = cell.content.replace('\n', " ").trim().to_string();
        // Spans come from the service and may overrun the grid.
        let row_span = cell
            .row_span
            .unwrap_or(1)
            .clamp(1, rows - cell.row_index);
        let col_span = cell
            .column_span
            .unwrap_or(1)
            .clamp(1, cols - cell.column_index);

        for dr in 0..row_span {
            for dc in 0..col_span {
                let (r, c) = (cell.row_index + dr, cell.column_index + dc);
                grid[r][c] = if dr == 0 && dc == 0 {
                    content.clone()
                } else {
                    String::new()
                };
            }
        }
    }

    let mut lines = Vec::with_capacity(rows + 1);
    for (idx, row) in grid.iter().enumerate() {
        lines.push(format!("| {} |", row.join(" | ")));
        if idx == 0 {
            lines.push(format!("| {} |", vec!["---"; cols].join(" | ")));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::TableCell;

    fn para(role: Option<ParagraphRole>, content: &str) -> RawParagraph {
        RawParagraph::new(role, content)
    }

    fn cell(row: usize, col: usize, content: &str) -> TableCell {
        TableCell {
            row_index: row,
            column_index: col,
            row_span: None,
            column_span: None,
            content: content.into(),
        }
    }

    #[test]
    fn groups_body_under_headings() {
        let paragraphs = vec![
            para(Some(ParagraphRole::Title), "Attention Is All You Need"),
            para(Some(ParagraphRole::SectionHeading), "Abstract"),
            para(None, "We propose the Transformer."),
            para(Some(ParagraphRole::PageNumber), "1"),
            para(Some(ParagraphRole::SectionHeading), " 1 Introduction "),
            para(None, "Recurrent models dominate."),
            para(Some(ParagraphRole::Footnote), "Equal contribution."),
        ];

        let blocks = group_sections(&paragraphs);
        let names: Vec<&str> = blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Title", "Abstract", "1 Introduction"]);
        assert_eq!(blocks[0].text, "Attention Is All You Need\n");
        assert_eq!(blocks[1].text, "We propose the Transformer.\n\n");
        assert_eq!(
            blocks[2].text,
            "Recurrent models dominate.\n\nEqual contribution.\n\n"
        );
    }

    #[test]
    fn body_before_any_heading_is_abstract() {
        let blocks = group_sections(&[para(None, "Opening words.")]);
        assert_eq!(blocks, vec![NamedTextBlock::new("Abstract", "Opening words.\n\n")]);
    }

    #[test]
    fn repeated_heading_resumes_block() {
        let blocks = group_sections(&[
            para(Some(ParagraphRole::SectionHeading), "Methods"),
            para(None, "one"),
            para(Some(ParagraphRole::SectionHeading), "Results"),
            para(None, "two"),
            para(Some(ParagraphRole::SectionHeading), "Methods"),
            para(None, "three"),
        ]);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text, "one\n\nthree\n\n");
    }

    #[test]
    fn noise_and_unknown_roles_are_dropped() {
        let blocks = group_sections(&[
            para(Some(ParagraphRole::PageHeader), "Preprint"),
            para(Some(ParagraphRole::PageFooter), "footer"),
            para(Some(ParagraphRole::Unrecognized), "???"),
        ]);
        assert!(blocks.is_empty());
    }

    #[test]
    fn renders_simple_table() {
        let table = LayoutTable {
            row_count: 2,
            column_count: 2,
            cells: vec![
                cell(0, 0, "Model"),
                cell(0, 1, "BLEU"),
                cell(1, 0, "Base"),
                cell(1, 1, "27.3\n"),
            ],
        };
        assert_eq!(
            table_to_markdown(&table),
            "| Model | BLEU |\n| --- | --- |\n| Base | 27.3 |"
        );
    }

    #[test]
    fn spanning_cell_fills_top_left_only() {
        let mut wide = cell(0, 0, "Scores");
        wide.column_span = Some(2);
        let table = LayoutTable {
            row_count: 2,
            column_count: 2,
            cells: vec![wide, cell(1, 0, "a"), cell(1, 1, "b")],
        };
        assert_eq!(
            table_to_markdown(&table),
            "| Scores |  |\n| --- | --- |\n| a | b |"
        );
    }

    #[test]
    fn out_of_range_cells_are_ignored() {
        let mut tall = cell(0, 0, "x");
        tall.row_span = Some(5);
        let table = LayoutTable {
            row_count: 1,
            column_count: 1,
            cells: vec![tall, cell(3, 3, "lost")],
        };
        assert_eq!(table_to_markdown(&table), "| x |\n| --- |");
    }

    #[test]
    fn huge_spans_are_clamped_to_the_grid() {
        let mut runaway = cell(1, 1, "wide");
        runaway.row_span = Some(usize::MAX);
        runaway.column_span = Some(usize::MAX);
        let table = LayoutTable {
            row_count: 3,
            column_count: 3,
            cells: vec![
                cell(0, 0, "h1"),
                cell(0, 1, "h2"),
                cell(0, 2, "h3"),
                cell(1, 0, "a"),
                cell(2, 0, "b"),
                runaway,
            ],
        };
        assert_eq!(
            table_to_markdown(&table),
            "| h1 | h2 | h3 |\n| --- | --- | --- |\n| a | wide |  |\n| b |  |  |"
        );
    }
}
