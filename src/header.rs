use rust_htslib::bam::{Header, HeaderView};

/// Return a copy of `header` with its `@HD` line's `SO` (sort-order) tag set to `sort_order`,
/// inserting a minimal `@HD` line ahead of everything else if `header` did not already have one.
///
/// Used to mark a run file's header as `unknown` (its records are only sorted within that one
/// file) and the fully merged file's header with a custom marker once every record in it is
/// globally ordered by sort key.
pub fn with_sort_order(header: &Header, sort_order: &[u8]) -> Header {
    let rewritten = rewrite_sort_order(header.to_bytes(), sort_order);
    Header::from_template(&HeaderView::from_bytes(&rewritten))
}

fn rewrite_sort_order(text: &[u8], sort_order: &[u8]) -> Vec<u8> {
    let text = String::from_utf8_lossy(text);
    let sort_order = String::from_utf8_lossy(sort_order);

    let mut saw_hd = false;
    let mut lines: Vec<String> = text
        .split('\n')
        .filter(|line| !line.is_empty())
        .map(|line| {
            if !line.starts_with("@HD") {
                return line.to_string();
            }
            saw_hd = true;
            let mut fields: Vec<String> = line.split('\t').map(str::to_string).collect();
            let mut found_so = false;
            for field in fields.iter_mut().skip(1) {
                if field.starts_with("SO:") {
                    *field = format!("SO:{sort_order}");
                    found_so = true;
                }
            }
            if !found_so {
                fields.push(format!("SO:{sort_order}"));
            }
            fields.join("\t")
        })
        .collect();

    if !saw_hd {
        lines.insert(0, format!("@HD\tVN:1.6\tSO:{sort_order}"));
    }

    let mut bytes = lines.join("\n").into_bytes();
    bytes.push(b'\n');
    bytes
}
