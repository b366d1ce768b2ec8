//! Employee table page.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid JSON data after decryption")]
    InvalidJson(#[source] serde_json::Error),
    #[error("invalid JSON data after decryption")]
    NonScalar { field: &'static str },
}

/// One row of the decrypted payload. Values are kept as display text and are
/// never interpreted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Employee {
    pub emp_no: String,
    pub birth_date: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub hire_date: String,
}

impl Employee {
    /// Unknown keys are ignored; a repeated key keeps its last value.
    fn from_row(row: &Map<String, Value>) -> Result<Self, RenderError> {
        let field = |name: &'static str| cell(name, row.get(name));
        Ok(Self {
            emp_no: field("emp_no")?,
            birth_date: field("birth_date")?,
            first_name: field("first_name")?,
            last_name: field("last_name")?,
            gender: field("gender")?,
            hire_date: field("hire_date")?,
        })
    }

    fn cells(&self) -> [&str; 6] {
        [
            self.emp_no.as_str(),
            self.birth_date.as_str(),
            self.first_name.as_str(),
            self.last_name.as_str(),
            self.gender.as_str(),
            self.hire_date.as_str(),
        ]
    }
}

const COLUMNS: [&str; 6] = [
    "Employee No",
    "Birth Date",
    "First Name",
    "Last Name",
    "Gender",
    "Hire Date",
];

fn cell(field: &'static str, value: Option<&Value>) -> Result<String, RenderError> {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(String::new()),
        Some(Value::Bool(true)) => Ok("1".to_string()),
        // Integral floats print without a fraction: 1.0 renders as "1".
        Some(Value::Number(n)) => Ok(match n.as_f64() {
            Some(f) if n.is_f64() => f.to_string(),
            _ => n.to_string(),
        }),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Array(_) | Value::Object(_)) => Err(RenderError::NonScalar { field }),
    }
}

/// Parses the decrypted plaintext, which must be a JSON array of objects.
pub fn parse_employees(plaintext: &[u8]) -> Result<Vec<Employee>, RenderError> {
    let rows: Vec<Map<String, Value>> =
        serde_json::from_slice(plaintext).map_err(RenderError::InvalidJson)?;
    rows.iter().map(Employee::from_row).collect()
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            other => out.push(other),
        }
    }
    out
}

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/css/bootstrap.min.css">
    <title>Employee List</title>
</head>
<body>
    <div class="container">
        <header class="d-flex justify-content-between my-4">
            <h1>Employee List</h1>
        </header>
        <table class="table table-bordered">
"#;

const PAGE_TAIL: &str = r#"        </table>
    </div>
</body>
</html>
"#;

pub fn render_page(employees: &[Employee]) -> String {
    let mut page = String::from(PAGE_HEAD);

    page.push_str("            <thead>\n                <tr>\n");
    for column in COLUMNS {
        page.push_str(&format!("                    <th>{column}</th>\n"));
    }
    page.push_str("                </tr>\n            </thead>\n            <tbody>\n");

    for employee in employees {
        page.push_str("                <tr>\n");
        for cell in employee.cells() {
            page.push_str(&format!("                    <td>{}</td>\n", escape_html(cell)));
        }
        page.push_str("                </tr>\n");
    }

    page.push_str("            </tbody>\n");
    page.push_str(PAGE_TAIL);
    page
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalars_as_display_text() {
        let rows = parse_employees(
            br#"[{"emp_no":10001,"birth_date":"1953-09-02","first_name":"Georgi","last_name":"Facello","gender":"M","hire_date":"1986-06-26","extra":{"ignored":true}}]"#,
        )
        .expect("parse");
        assert_eq!(
            rows,
            vec![Employee {
                emp_no: "10001".into(),
                birth_date: "1953-09-02".into(),
                first_name: "Georgi".into(),
                last_name: "Facello".into(),
                gender: "M".into(),
                hire_date: "1986-06-26".into(),
            }]
        );
    }

    #[test]
    fn missing_and_null_fields_render_empty() {
        let rows = parse_employees(br#"[{"emp_no":null,"first_name":true,"last_name":false}]"#)
            .expect("parse");
        assert_eq!(rows[0].emp_no, "");
        assert_eq!(rows[0].first_name, "1");
        assert_eq!(rows[0].last_name, "");
        assert_eq!(rows[0].hire_date, "");
    }

    #[test]
    fn repeated_keys_keep_the_last_value() {
        let rows = parse_employees(br#"[{"emp_no":1,"emp_no":2}]"#).expect("parse");
        assert_eq!(rows[0].emp_no, "2");
        let page = render_page(&rows);
        assert!(page.contains("<td>2</td>"));
        assert!(!page.contains("<td>1</td>"));
    }

    #[test]
    fn floats_drop_an_integral_fraction() {
        let rows =
            parse_employees(br#"[{"emp_no":1.0,"first_name":2.5,"last_name":-3}]"#).expect("parse");
        assert_eq!(rows[0].emp_no, "1");
        assert_eq!(rows[0].first_name, "2.5");
        assert_eq!(rows[0].last_name, "-3");
    }

    #[test]
    fn nested_field_names_the_offending_key() {
        let err = parse_employees(br#"[{"gender":{"code":"M"}}]"#).unwrap_err();
        assert!(matches!(err, RenderError::NonScalar { field: "gender" }));
    }

    #[test]
    fn rejects_non_array_payloads() {
        let payloads: [&[u8]; 5] = [
            br#"{"emp_no":1}"#,
            b"42",
            b"not json",
            br#"[1, 2]"#,
            br#"[{"emp_no":[1]}]"#,
        ];
        for bad in payloads {
            let err = parse_employees(bad).unwrap_err();
            assert_eq!(err.to_string(), "invalid JSON data after decryption");
        }
    }

    #[test]
    fn empty_list_renders_empty_body() {
        let page = render_page(&[]);
        assert!(page.contains("<tbody>\n            </tbody>"));
        assert!(page.contains("<th>Employee No</th>"));
        assert!(page.contains("<th>Hire Date</th>"));
    }

    #[test]
    fn cells_are_escaped() {
        let page = render_page(&[Employee {
            first_name: "<script>alert('x')</script>".into(),
            last_name: "O\"Brien & Sons".into(),
            ..Employee::default()
        }]);
        assert!(page.contains("<td>&lt;script&gt;alert(&#039;x&#039;)&lt;/script&gt;</td>"));
        assert!(page.contains("<td>O&quot;Brien &amp; Sons</td>"));
        assert!(!page.contains("<script>"));
    }

    #[test]
    fn rows_keep_payload_order() {
        let page = render_page(&[
            Employee { emp_no: "2".into(), ..Employee::default() },
            Employee { emp_no: "1".into(), ..Employee::default() },
        ]);
        let first = page.find("<td>2</td>").expect("row 2");
        let second = page.find("<td>1</td>").expect("row 1");
        assert!(first < second);
    }
}
