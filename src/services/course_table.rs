use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CourseTable {
    pub(crate) columns: Vec<String>,
    pub(crate) rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CourseRecord {
    pub(crate) course_id: u64,
    // 1-based, header included.
    pub(crate) row: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum TableError {
    #[error("course table has no header row")]
    MissingHeader,
    #[error("course table has no column named '{0}'")]
    MissingColumn(String),
}

impl CourseTable {
    pub(crate) fn from_values(mut values: Vec<Vec<String>>) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let columns = values.remove(0);
        Self { columns, rows: values }
    }

    pub(crate) fn strip_column_labels(&mut self) {
        for column in &mut self.columns {
            *column = column.trim().to_string();
        }
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }
}

// Placeholders such as `Shell`, `shell(23333)`, `n/a` or blanks are dropped.
pub(crate) fn clean_course_table(
    table: &mut CourseTable,
    course_id_column: &str,
) -> Result<Vec<CourseRecord>, TableError> {
    if table.columns.is_empty() {
        return Err(TableError::MissingHeader);
    }

    table.strip_column_labels();
    let index = table
        .column_index(course_id_column.trim())
        .ok_or_else(|| TableError::MissingColumn(course_id_column.to_string()))?;

    let mut records = Vec::new();
    for (offset, cells) in table.rows.iter().enumerate() {
        let row = offset + 2;
        let raw = cells.get(index).map(|cell| cell.trim()).unwrap_or_default();

        match parse_course_id(raw) {
            Some(course_id) => records.push(CourseRecord { course_id, row }),
            None => tracing::debug!(row, value = raw, "Skipping row without a course id"),
        }
    }

    Ok(records)
}

fn parse_course_id(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}
