//! Drive search-query (`q`) construction.

use postwatch_core::ListQuery;

/// Quote a literal for the Drive query language.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

/// Build the `q` parameter for a listing. Trashed items are always excluded.
pub fn build_query(query: &ListQuery) -> String {
    let mut clauses = Vec::with_capacity(4);

    if let Some(parent) = &query.parent {
        clauses.push(format!("{} in parents", quote(parent.as_str())));
    }
    if let Some(name) = &query.name {
        clauses.push(format!("name = {}", quote(name)));
    }
    match query.mime_types.as_slice() {
        [] => {}
        [single] => clauses.push(format!("mimeType = {}", quote(single))),
        many => {
            let any = many
                .iter()
                .map(|mime| format!("mimeType = {}", quote(mime)))
                .collect::<Vec<_>>()
                .join(" or ");
            clauses.push(format!("({any})"));
        }
    }
    clauses.push("trashed = false".to_string());

    clauses.join(" and ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use postwatch_core::ItemId;
    use postwatch_core::model::{DOCX_MIME, FOLDER_MIME, NATIVE_DOC_MIME};

    #[test]
    fn root_lookup_by_name_and_type() {
        let q = build_query(&ListQuery::named("attic-posts").with_mime(FOLDER_MIME));
        assert_eq!(
            q,
            "name = 'attic-posts' and mimeType = 'application/vnd.google-apps.folder' and trashed = false"
        );
    }

    #[test]
    fn children_with_several_types_are_grouped() {
        let q = build_query(
            &ListQuery::children_of(&ItemId::new("abc123"))
                .with_mime(DOCX_MIME)
                .with_mime(NATIVE_DOC_MIME),
        );
        assert_eq!(
            q,
            format!(
                "'abc123' in parents and (mimeType = '{DOCX_MIME}' or mimeType = '{NATIVE_DOC_MIME}') and trashed = false"
            )
        );
    }

    #[test]
    fn quotes_in_names_are_escaped() {
        let q = build_query(&ListQuery::named("o'brien\\posts"));
        assert_eq!(q, "name = 'o\\'brien\\\\posts' and trashed = false");
    }

    #[test]
    fn empty_query_still_skips_trash() {
        assert_eq!(build_query(&ListQuery::default()), "trashed = false");
    }
}
