use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AssignmentGroup {
    pub(crate) id: u64,
    pub(crate) name: String,
    // Left raw so unrelated groups never need to parse.
    #[serde(default)]
    assignments: Vec<Value>,
}

impl AssignmentGroup {
    pub(crate) fn assignments(&self) -> Result<Vec<Assignment>, serde_json::Error> {
        self.assignments.iter().map(|value| Assignment::deserialize(value)).collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Assignment {
    pub(crate) id: u64,
    pub(crate) name: String,
}

/// Any Canvas object that is only needed for its id.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CreatedResource {
    pub(crate) id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Rubric {
    pub(crate) id: u64,
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) points_possible: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assignment_group_defaults_missing_assignments() {
        let group: AssignmentGroup =
            serde_json::from_value(json!({"id": 7, "name": "Homework", "position": 1}))
                .expect("group");
        assert_eq!(group.id, 7);
        assert!(group.assignments().expect("assignments").is_empty());
    }

    #[test]
    fn assignments_parse_on_demand() {
        let group: AssignmentGroup = serde_json::from_value(json!({
            "id": 8,
            "name": "Other",
            "assignments": [{"id": 1, "name": "Essay"}, {"id": 2, "name": null}]
        }))
        .expect("group");

        assert!(group.assignments().is_err());
    }

    #[test]
    fn rubric_parses_without_points() {
        let rubric: Rubric =
            serde_json::from_value(json!({"id": 3, "title": "IPE"})).expect("rubric");
        assert_eq!(rubric.title, "IPE");
        assert!(rubric.points_possible.is_none());
    }
}
