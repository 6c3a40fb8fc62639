use std::io::BufWriter;

use printpdf::*;

/// Renders the letter text as a single-column A4 PDF and returns the bytes.
/// The page flows: a new page is added whenever the cursor reaches the bottom
/// margin.
pub fn letter_pdf(title: &str, content: &str) -> anyhow::Result<Vec<u8>> {
    let (doc, page1, layer1) = PdfDocument::new(title, Mm(210.0), Mm(297.0), "Layer 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| anyhow::anyhow!("PDF font error: {e}"))?;

    let mut layer = doc.get_page(page1).get_layer(layer1);
    let mut y = Mm(280.0);

    for raw_line in content.lines() {
        if raw_line.trim().is_empty() {
            y -= Mm(5.0);
            continue;
        }

        for line in wrap_text(raw_line, 90) {
            if y < Mm(15.0) {
                let (next_page, next_layer) = doc.add_page(Mm(210.0), Mm(297.0), "Layer 1");
                layer = doc.get_page(next_page).get_layer(next_layer);
                y = Mm(280.0);
            }
            layer.use_text(&line, 11.0, Mm(20.0), y, &font);
            y -= Mm(5.0);
        }
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| anyhow::anyhow!("PDF save error: {e}"))?;
    buf.into_inner()
        .map_err(|e| anyhow::anyhow!("PDF buffer error: {e}"))
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(current.clone());
            current.clear();
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
