use std::fmt;

// ---------------------------------------------------------------------------
// PostgREST select query
//
// The store exposes each table at `/rest/v1/{table}` and takes everything as
// query parameters:
//
//   select=id,created_at,soil
//   created_at=gte.2025-03-01T00:00:00Z
//   order=created_at.desc
//   limit=1
// ---------------------------------------------------------------------------

/// Comparison operators understood by the REST filter syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOp {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Asc,
    Desc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Order {
    pub column: String,
    pub direction: Direction,
}

/// `select(table, fields, filter, order, limit)` as a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectQuery {
    table: String,
    fields: String,
    filters: Vec<Filter>,
    order: Option<Order>,
    limit: Option<usize>,
}

impl SelectQuery {
    /// All columns, no filter, server-side ordering and limit.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            fields: "*".to_owned(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn fields(mut self, fields: impl Into<String>) -> Self {
        self.fields = fields.into();
        self
    }

    pub fn filter(mut self, column: impl Into<String>, op: FilterOp, value: impl Into<String>) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn order(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order = Some(Order {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Query-string pairs in a stable order: select, filters, order, limit.
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_owned(), self.fields.clone())];
        for f in &self.filters {
            params.push((f.column.clone(), format!("{}.{}", f.op.as_str(), f.value)));
        }
        if let Some(order) = &self.order {
            params.push(("order".to_owned(), format!("{}.{}", order.column, order.direction)));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_owned(), limit.to_string()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_query_selects_everything() {
        let q = SelectQuery::new("sensor_log");
        assert_eq!(q.table(), "sensor_log");
        assert_eq!(q.params(), vec![("select".to_owned(), "*".to_owned())]);
    }

    #[test]
    fn latest_record_shape() {
        let q = SelectQuery::new("sensor_log")
            .fields("id,created_at")
            .order("created_at", Direction::Desc)
            .limit(1);
        assert_eq!(
            q.params(),
            vec![
                ("select".to_owned(), "id,created_at".to_owned()),
                ("order".to_owned(), "created_at.desc".to_owned()),
                ("limit".to_owned(), "1".to_owned()),
            ]
        );
    }

    #[test]
    fn filters_render_as_operator_prefix() {
        let q = SelectQuery::new("sensor_log")
            .filter("created_at", FilterOp::Gte, "2025-03-01T00:00:00+00:00")
            .filter("soil", FilterOp::Lt, "30");
        let params = q.params();
        assert_eq!(params[1], ("created_at".to_owned(), "gte.2025-03-01T00:00:00+00:00".to_owned()));
        assert_eq!(params[2], ("soil".to_owned(), "lt.30".to_owned()));
    }

    #[test]
    fn queries_with_same_shape_are_equal() {
        let a = SelectQuery::new("vision_log").limit(200);
        let b = SelectQuery::new("vision_log").limit(200);
        let c = SelectQuery::new("vision_log").limit(201);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
