//! Placeholder dialects and `?` rebinding.

/// Placeholder style used by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `?` (SQLite, MySQL).
    Question,
    /// `$1, $2, ...` (PostgreSQL).
    Dollar,
    /// `@p1, @p2, ...` (SQL Server).
    At,
    /// `:1, :2, ...` (Oracle).
    Colon,
}

impl Dialect {
    /// Resolves the placeholder style for a driver name.
    pub fn from_driver(driver: &str) -> Option<Self> {
        match driver.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" | "mysql" => Some(Self::Question),
            "postgres" | "postgresql" | "pgx" => Some(Self::Dollar),
            "sqlserver" | "mssql" => Some(Self::At),
            "oracle" | "godror" => Some(Self::Colon),
            _ => None,
        }
    }

    /// Translates generic `?` placeholders into this dialect's style.
    ///
    /// Question marks inside single-quoted literals, double-quoted identifiers
    /// and comments are left untouched.
    pub fn rebind(self, sql: &str) -> String {
        if self == Self::Question {
            return sql.to_string();
        }

        let mut out = String::with_capacity(sql.len() + 8);
        let mut position = 0usize;
        let mut chars = sql.chars().peekable();
        let mut quote: Option<char> = None;

        while let Some(ch) = chars.next() {
            if let Some(open) = quote {
                out.push(ch);
                if ch == open {
                    quote = None;
                }
                continue;
            }

            match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    out.push(ch);
                }
                '-' if chars.peek() == Some(&'-') => {
                    out.push(ch);
                    for rest in chars.by_ref() {
                        out.push(rest);
                        if rest == '\n' {
                            break;
                        }
                    }
                }
                '/' if chars.peek() == Some(&'*') => {
                    out.push(ch);
                    // Opening `*`; it must not pair with a following `/`.
                    if let Some(star) = chars.next() {
                        out.push(star);
                    }
                    let mut previous = '\0';
                    for rest in chars.by_ref() {
                        out.push(rest);
                        if previous == '*' && rest == '/' {
                            break;
                        }
                        previous = rest;
                    }
                }
                '?' => {
                    position += 1;
                    match self {
                        Self::Dollar => out.push_str(&format!("${position}")),
                        Self::At => out.push_str(&format!("@p{position}")),
                        Self::Colon => out.push_str(&format!(":{position}")),
                        Self::Question => out.push('?'),
                    }
                }
                _ => out.push(ch),
            }
        }

        out
    }
}
