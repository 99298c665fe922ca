//! `_where` conditions: equality maps and `?` placeholder substitution.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};

/// A positional value substituted for a `?` in a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// Rendered as a bare decimal.
    Int(i64),
    /// Rendered with two decimals.
    Float(f64),
    /// Rendered as `'yyyy-MM-dd'`.
    Date(NaiveDate),
    /// Rendered single-quoted.
    Text(String),
}

impl Argument {
    /// The literal that replaces a placeholder.
    pub fn to_literal(&self) -> String {
        match self {
            Argument::Int(v) => v.to_string(),
            Argument::Float(v) => format!("{v:.2}"),
            Argument::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
            Argument::Text(s) => format!("'{}'", escape_text(s)),
        }
    }
}

/// Quotes are doubled and commas become `''`; nothing else is escaped.
fn escape_text(s: &str) -> String {
    s.replace('\'', "''").replace(',', "''")
}

macro_rules! int_argument {
    ($($t:ty),*) => {
        $(impl From<$t> for Argument {
            fn from(v: $t) -> Self {
                Argument::Int(i64::from(v))
            }
        })*
    };
}

int_argument!(i8, i16, i32, i64, u8, u16, u32);

/// Wider integers saturate at the `i64` bounds.
macro_rules! saturating_int_argument {
    ($($t:ty),*) => {
        $(impl From<$t> for Argument {
            #[allow(unused_comparisons)]
            fn from(v: $t) -> Self {
                let fallback = if v < 0 { i64::MIN } else { i64::MAX };
                Argument::Int(i64::try_from(v).unwrap_or(fallback))
            }
        })*
    };
}

saturating_int_argument!(u64, usize, isize);

impl From<f32> for Argument {
    fn from(v: f32) -> Self {
        Argument::Float(f64::from(v))
    }
}

impl From<f64> for Argument {
    fn from(v: f64) -> Self {
        Argument::Float(v)
    }
}

impl From<bool> for Argument {
    fn from(v: bool) -> Self {
        Argument::Text(v.to_string())
    }
}

impl From<&str> for Argument {
    fn from(v: &str) -> Self {
        Argument::Text(v.to_string())
    }
}

impl From<String> for Argument {
    fn from(v: String) -> Self {
        Argument::Text(v)
    }
}

impl From<NaiveDate> for Argument {
    fn from(v: NaiveDate) -> Self {
        Argument::Date(v)
    }
}

impl From<NaiveDateTime> for Argument {
    fn from(v: NaiveDateTime) -> Self {
        Argument::Date(v.date())
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Argument {
    fn from(v: DateTime<Tz>) -> Self {
        Argument::Date(v.date_naive())
    }
}

/// Which rows a list or count call selects.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Filter {
    #[default]
    None,
    /// Every field must equal its value. Entries keep their order.
    Equals(Vec<(String, String)>),
    /// A raw condition whose `?` placeholders take `arguments` in order.
    Condition {
        condition: String,
        arguments: Vec<Argument>,
    },
}

impl Filter {
    pub fn equals<K, V, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Filter::Equals(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// A condition used as-is, without placeholder substitution.
    pub fn raw(condition: &str) -> Self {
        Filter::Condition {
            condition: condition.to_string(),
            arguments: Vec::new(),
        }
    }

    pub fn condition(condition: &str, arguments: Vec<Argument>) -> Self {
        Filter::Condition {
            condition: condition.to_string(),
            arguments,
        }
    }

    /// The decoded `_where` text, or `None` when nothing is filtered.
    pub fn to_where(&self) -> Option<String> {
        let text = match self {
            Filter::None => return None,
            Filter::Equals(entries) if entries.is_empty() => return None,
            Filter::Equals(entries) => equals_condition(entries),
            Filter::Condition {
                condition,
                arguments,
            } => format_arguments(condition, arguments),
        };
        (!text.is_empty()).then_some(text)
    }
}

/// `(a='1') AND (b='2')` in entry order.
pub fn equals_condition(entries: &[(String, String)]) -> String {
    entries
        .iter()
        .map(|(field, value)| format!("({field}='{value}')"))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Replaces each `?` in `condition` with the next argument's literal.
///
/// Placeholders left over once the arguments run out stay as literal `?`;
/// arguments left over once the placeholders run out are ignored.
pub fn format_arguments(condition: &str, arguments: &[Argument]) -> String {
    let mut out = String::with_capacity(condition.len());
    let mut args = arguments.iter();
    let mut rest = condition;

    while let Some(pos) = rest.find('?') {
        let Some(arg) = args.next() else {
            break;
        };
        out.push_str(&rest[..pos]);
        out.push_str(&arg.to_literal());
        rest = &rest[pos + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_quoted_text_and_bare_integer() {
        let got = format_arguments(
            "name=? and age=?",
            &[Argument::from("O'Brien"), Argument::from(30)],
        );
        assert_eq!(got, "name='O''Brien' and age=30");
    }

    #[test]
    fn commas_in_text_become_doubled_quotes() {
        let got = format_arguments("name=?", &["Smith, John".into()]);
        assert_eq!(got, "name='Smith'' John'");
    }

    #[test]
    fn wide_integers_convert_and_saturate() {
        assert_eq!(Argument::from(42usize), Argument::Int(42));
        assert_eq!(Argument::from(-7isize), Argument::Int(-7));
        assert_eq!(Argument::from(u64::MAX), Argument::Int(i64::MAX));
        let rows: u64 = 1_000;
        assert_eq!(format_arguments("line<?", &[rows.into()]), "line<1000");
    }

    #[test]
    fn floats_use_two_decimals() {
        let got = format_arguments("price>? and qty<?", &[Argument::from(9.5), Argument::from(1.005f32)]);
        assert!(got.starts_with("price>9.50 and qty<1.0"));
    }

    #[test]
    fn dates_render_as_quoted_iso_days() {
        let day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let at = day.and_hms_opt(23, 59, 0).unwrap();
        let got = format_arguments("created>=? and created<?", &[day.into(), at.into()]);
        assert_eq!(got, "created>='2024-02-29' and created<'2024-02-29'");
    }

    #[test]
    fn booleans_are_quoted_strings() {
        assert_eq!(format_arguments("active=?", &[true.into()]), "active='true'");
    }

    #[test]
    fn unmatched_placeholders_pass_through() {
        let got = format_arguments("a=? and b=? and c=?", &[Argument::from(1)]);
        assert_eq!(got, "a=1 and b=? and c=?");
    }

    #[test]
    fn excess_arguments_are_ignored() {
        let got = format_arguments("a=?", &[Argument::from(1), Argument::from(2)]);
        assert_eq!(got, "a=1");
    }

    #[test]
    fn percent_signs_are_left_alone() {
        let got = format_arguments("name like ?", &["%bolt%".into()]);
        assert_eq!(got, "name like '%bolt%'");
    }

    #[test]
    fn equals_filter_has_one_clause_per_entry_in_order() {
        let filter = Filter::equals([("organization", "0"), ("client", "23C5"), ("name", "x")]);
        let text = filter.to_where().unwrap();
        assert_eq!(text, "(organization='0') AND (client='23C5') AND (name='x')");
        assert_eq!(text.matches(" AND ").count(), 2);
    }

    #[test]
    fn empty_filters_produce_no_condition() {
        assert_eq!(Filter::None.to_where(), None);
        assert_eq!(Filter::Equals(Vec::new()).to_where(), None);
        assert_eq!(Filter::raw("").to_where(), None);
    }

    #[test]
    fn raw_condition_is_untouched() {
        assert_eq!(Filter::raw("active = true").to_where().as_deref(), Some("active = true"));
    }
}
