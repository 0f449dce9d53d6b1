//! Fixed-width projection rows used by the sync fast path.

use arrayvec::ArrayVec;

use crate::model::{EntitySearchDescriptor, FieldSource, Record, Value};

/// Most columns a projection row carries besides the id.
pub const PROJECTION_WIDTH: usize = 16;

/// The id followed by up to [`PROJECTION_WIDTH`] projected columns.
pub type ProjectionRow = ArrayVec<Value, { PROJECTION_WIDTH + 1 }>;

/// Which source properties a descriptor needs, id first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionPlan {
    columns: Vec<String>,
}

impl ProjectionPlan {
    /// `None` when the descriptor cannot be served from projection rows: the
    /// id is computed, a computed field has no declared dependencies, or the
    /// columns do not fit in a row.
    pub fn for_descriptor(descriptor: &EntitySearchDescriptor) -> Option<Self> {
        let FieldSource::Property(id) = &descriptor.id_field().source else {
            return None;
        };
        let mut columns = vec![id.clone()];
        for fd in descriptor.fields() {
            let needed: &[String] = match &fd.source {
                FieldSource::Property(p) => std::slice::from_ref(p),
                FieldSource::Computed(_) if fd.depends.is_empty() => return None,
                FieldSource::Computed(_) => &fd.depends,
            };
            for p in needed {
                if !columns.contains(p) {
                    columns.push(p.clone());
                }
            }
        }
        (columns.len() <= PROJECTION_WIDTH + 1).then_some(Self { columns })
    }

    /// Column names, id first.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn view<'a>(&'a self, row: &'a ProjectionRow) -> RowView<'a> {
        RowView {
            columns: &self.columns,
            row,
        }
    }
}

/// Read a projected record from any full record, column by column.
pub fn project(record: &dyn Record, columns: &[String]) -> Option<ProjectionRow> {
    let mut row = ProjectionRow::new();
    for column in columns {
        row.try_push(record.get(column).unwrap_or_default()).ok()?;
    }
    Some(row)
}

/// A projection row seen through the [`Record`] trait.
pub struct RowView<'a> {
    columns: &'a [String],
    row: &'a ProjectionRow,
}

impl Record for RowView<'_> {
    fn get(&self, property: &str) -> Option<Value> {
        let slot = self.columns.iter().position(|c| c == property)?;
        self.row.get(slot).filter(|v| !v.is_null()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldDescriptor;

    fn base() -> crate::model::DescriptorBuilder {
        EntitySearchDescriptor::builder("Book")
            .id_field(FieldDescriptor::property("id"))
            .field(FieldDescriptor::property("title"))
    }

    #[test]
    fn plan_collects_properties_and_dependencies_once() {
        let d = base()
            .field(
                FieldDescriptor::computed(|r| r.get("title"))
                    .named("label")
                    .depends_on(["title", "author"]),
            )
            .build()
            .unwrap();
        let plan = ProjectionPlan::for_descriptor(&d).unwrap();
        assert_eq!(plan.columns(), ["id", "title", "author"]);
    }

    #[test]
    fn computed_field_without_dependencies_has_no_plan() {
        let d = base()
            .field(FieldDescriptor::computed(|r| r.get("title")).named("label"))
            .build()
            .unwrap();
        assert!(ProjectionPlan::for_descriptor(&d).is_none());
    }

    #[test]
    fn too_many_columns_has_no_plan() {
        let mut builder = EntitySearchDescriptor::builder("Wide")
            .id_field(FieldDescriptor::property("id"));
        for i in 0..=PROJECTION_WIDTH {
            builder = builder.field(FieldDescriptor::property(format!("c{i}")));
        }
        assert!(ProjectionPlan::for_descriptor(&builder.build().unwrap()).is_none());
    }

    #[test]
    fn row_view_reads_columns_by_name() {
        let d = base().build().unwrap();
        let plan = ProjectionPlan::for_descriptor(&d).unwrap();
        let mut row = ProjectionRow::new();
        row.push(Value::from("b1"));
        row.push(Value::Null);
        let view = plan.view(&row);
        assert_eq!(view.get("id"), Some(Value::from("b1")));
        assert_eq!(view.get("title"), None);
        assert_eq!(view.get("nope"), None);
    }
}
