use sea_orm::sea_query::LikeExpr;

/// Case folding used for both stored search columns and search terms.
pub fn fold(raw: &str) -> String {
    raw.to_lowercase()
}

/// Makes `%`, `_` and `\` match literally under `ESCAPE '\'`.
pub fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Substring pattern for a folded column.
pub fn contains(term: &str) -> LikeExpr {
    LikeExpr::new(format!("%{}%", escape_like(&fold(term)))).escape('\\')
}
