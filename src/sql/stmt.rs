//! Statement model handed over by the external parser, plus the
//! visitor seam the planner dispatches through. The engine executes
//! SELECT; every other kind is modeled so visitors stay exhaustive
//! and rejection is explicit rather than structural.

use crate::error::Result;
use crate::sql::node::find_identity_field;
use crate::sql::node::find_identity_name;
use crate::sql::node::BinaryNode;
use crate::sql::node::IdentityNode;
use crate::sql::node::Node;
use crate::sql::node::NodeType;
use crate::sql::token::Pos;
use crate::sql::token::Token;
use crate::sql::token::TokenType;

#[derive(Debug, Clone)]
pub enum Statement {
    /// ```sql
    /// SELECT a, b FROM t WHERE ...
    /// ```
    Select(SqlSelect),
    /// ```sql
    /// INSERT INTO t (a, b) VALUES (...)
    /// ```
    Insert(SqlInsert),
    /// ```sql
    /// UPDATE t SET a = 1 WHERE ...
    /// ```
    Update(SqlUpdate),
    /// ```sql
    /// UPSERT INTO t (a, b) VALUES (...)
    /// ```
    Upsert(SqlUpsert),
    /// ```sql
    /// DELETE FROM t WHERE ...
    /// ```
    Delete(SqlDelete),
    /// ```sql
    /// SHOW TABLES
    /// ```
    Show(SqlShow),
    /// ```sql
    /// DESCRIBE t
    /// ```
    Describe(SqlDescribe),
    /// ```sql
    /// PREPARE name FROM ...
    /// ```
    Prepared(PreparedStatement),
}

impl Statement {
    pub fn node_type(&self) -> NodeType {
        match self {
            Statement::Select(_) => NodeType::SqlSelect,
            Statement::Insert(_) => NodeType::SqlInsert,
            Statement::Update(_) => NodeType::SqlUpdate,
            Statement::Upsert(_) => NodeType::SqlUpsert,
            Statement::Delete(_) => NodeType::SqlDelete,
            Statement::Show(_) => NodeType::SqlShow,
            Statement::Describe(_) => NodeType::SqlDescribe,
            Statement::Prepared(_) => NodeType::SqlPrepared,
        }
    }

    pub fn position(&self) -> Pos {
        match self {
            Statement::Select(s) => s.pos,
            Statement::Insert(s) => s.pos,
            Statement::Update(s) => s.pos,
            Statement::Upsert(s) => s.pos,
            Statement::Delete(s) => s.pos,
            Statement::Show(s) => s.pos,
            Statement::Describe(s) => s.pos,
            Statement::Prepared(s) => s.pos,
        }
    }

    /// Validates every expression the statement holds. First failure
    /// wins, like node validation.
    pub fn check(&self) -> Result<()> {
        match self {
            Statement::Select(s) => s.check(),
            Statement::Insert(s) => s.check(),
            Statement::Update(s) => s.check(),
            Statement::Upsert(s) => s.check(),
            Statement::Delete(s) => s.check(),
            Statement::Show(_) | Statement::Describe(_) => Ok(()),
            Statement::Prepared(s) => s.statement.check(),
        }
    }

    /// Routes the statement to its visitor method. The match is
    /// exhaustive so a new statement kind breaks compilation here and
    /// in every visitor, not at runtime.
    pub fn accept<V: Visitor>(&self, visitor: &mut V) -> Result<V::Output> {
        match self {
            Statement::Select(s) => visitor.visit_select(s),
            Statement::Insert(s) => visitor.visit_insert(s),
            Statement::Update(s) => visitor.visit_update(s),
            Statement::Upsert(s) => visitor.visit_upsert(s),
            Statement::Delete(s) => visitor.visit_delete(s),
            Statement::Show(s) => visitor.visit_show(s),
            Statement::Describe(s) => visitor.visit_describe(s),
            Statement::Prepared(s) => visitor.visit_prepared(s),
        }
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Statement::Select(s) => s.fmt(f),
            Statement::Insert(s) => s.fmt(f),
            Statement::Update(s) => s.fmt(f),
            Statement::Upsert(s) => s.fmt(f),
            Statement::Delete(s) => s.fmt(f),
            Statement::Show(s) => write!(f, "SHOW {}", s.identity),
            Statement::Describe(s) => write!(f, "DESCRIBE {}", s.identity),
            Statement::Prepared(s) => write!(f, "PREPARE {} FROM {}", s.alias, s.statement),
        }
    }
}

/// Statement-level visitor. Implementations produce whatever a pass
/// needs: the planner produces a task list.
pub trait Visitor {
    type Output;

    fn visit_select(&mut self, stmt: &SqlSelect) -> Result<Self::Output>;
    fn visit_insert(&mut self, stmt: &SqlInsert) -> Result<Self::Output>;
    fn visit_update(&mut self, stmt: &SqlUpdate) -> Result<Self::Output>;
    fn visit_upsert(&mut self, stmt: &SqlUpsert) -> Result<Self::Output>;
    fn visit_delete(&mut self, stmt: &SqlDelete) -> Result<Self::Output>;
    fn visit_show(&mut self, stmt: &SqlShow) -> Result<Self::Output>;
    fn visit_describe(&mut self, stmt: &SqlDescribe) -> Result<Self::Output>;
    fn visit_prepared(&mut self, stmt: &PreparedStatement) -> Result<Self::Output>;
}

/// Visitor over FROM-clause elements: nested sub-selects and joined
/// sources. Self-planning backends receive one of these to delegate
/// nested planning back to the engine.
pub trait SubVisitor {
    type Output;

    fn visit_subselect(&mut self, source: &SqlSource) -> Result<Self::Output>;
    fn visit_join(&mut self, source: &SqlSource) -> Result<Self::Output>;
}

#[derive(Debug, Clone, Default)]
pub struct SqlSelect {
    pub pos: Pos,
    /// Original statement text, carried for log and error context.
    pub raw: String,
    pub star: bool,
    pub columns: Vec<Column>,
    pub from: Vec<SqlSource>,
    pub where_clause: Option<SqlWhere>,
}

impl SqlSelect {
    pub fn new(pos: Pos) -> SqlSelect {
        SqlSelect { pos, ..Default::default() }
    }

    pub fn node_type(&self) -> NodeType {
        NodeType::SqlSelect
    }

    pub fn check(&self) -> Result<()> {
        for column in &self.columns {
            if let Some(expr) = &column.expr {
                expr.check()?;
            }
        }
        for source in &self.from {
            if let Some(expr) = &source.join_expr {
                expr.check()?;
            }
            if let Some(sub) = &source.source {
                sub.check()?;
            }
        }
        if let Some(where_clause) = &self.where_clause {
            where_clause.check()?;
        }
        Ok(())
    }
}

impl std::fmt::Display for SqlSelect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SELECT ")?;
        if self.star {
            f.write_str("*")?;
        } else {
            let columns =
                self.columns.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", ");
            f.write_str(&columns)?;
        }
        if !self.from.is_empty() {
            f.write_str(" FROM ")?;
            for (i, source) in self.from.iter().enumerate() {
                if i > 0 {
                    // A joined source renders its own JOIN keyword.
                    if source.node_type() == NodeType::SqlJoin {
                        f.write_str(" ")?;
                    } else {
                        f.write_str(", ")?;
                    }
                }
                write!(f, "{}", source)?;
            }
        }
        if let Some(where_clause) = &self.where_clause {
            write!(f, " WHERE {}", where_clause)?;
        }
        Ok(())
    }
}

/// One selected column or expression.
#[derive(Debug, Clone)]
pub struct Column {
    pub pos: Pos,
    /// Name of the underlying field, when one exists: the identity
    /// itself, or the first identity under an expression.
    pub source_field: String,
    pub star: bool,
    pub expr: Option<Node>,
    /// Explicit `AS` alias.
    pub alias: Option<String>,
}

impl Column {
    pub fn from_expr(pos: Pos, expr: Node) -> Column {
        let source_field = find_identity_field(&expr).unwrap_or_default().to_string();
        Column { pos, source_field, star: false, expr: Some(expr), alias: None }
    }

    pub fn star(pos: Pos) -> Column {
        Column { pos, source_field: String::new(), star: true, expr: None, alias: None }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Column {
        self.alias = Some(alias.into());
        self
    }

    /// Output name for the column: the explicit alias, else an alias
    /// synthesized from the expression, else the source field.
    pub fn as_name(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        if let Some(expr) = &self.expr {
            let name = find_identity_name(0, expr, "");
            if !name.is_empty() {
                return name;
            }
        }
        self.source_field.clone()
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.star {
            return f.write_str("*");
        }
        match (&self.expr, &self.alias) {
            (Some(expr), Some(alias)) => write!(f, "{} AS {}", expr, alias),
            (Some(expr), None) => write!(f, "{}", expr),
            (None, _) => f.write_str(&self.source_field),
        }
    }
}

/// One FROM-clause element: a table reference, optionally joined,
/// optionally a nested sub-select. `rewrite` adds the per-side join
/// products the planner uses for two-table statements.
#[derive(Debug, Clone, Default)]
pub struct SqlSource {
    pub pos: Pos,
    pub name: String,
    pub alias: Option<String>,
    /// Join metadata from the parser: constraint operator (ON), side
    /// and kind, and the ON expression.
    pub op: Option<TokenType>,
    pub left_or_right: Option<TokenType>,
    pub join_type: Option<TokenType>,
    pub join_expr: Option<Node>,
    /// Nested sub-select in place of a named table.
    pub source: Option<Box<SqlSelect>>,

    /// Rewrite products, set by `rewrite` on join planning.
    /// Conjuncts of the WHERE clause this side can pre-filter on.
    pub filter: Option<Node>,
    /// This side's operands of cross-source equality constraints, in
    /// encounter order. Join key extraction hints, nothing more.
    pub join_nodes: Vec<Node>,
    /// True for the side the join folds onto (the build side).
    pub fold: bool,
}

impl SqlSource {
    pub fn table(pos: Pos, name: impl Into<String>) -> SqlSource {
        SqlSource { pos, name: name.into(), ..Default::default() }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> SqlSource {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_join(mut self, join_type: TokenType, join_expr: Node) -> SqlSource {
        self.op = Some(TokenType::On);
        self.join_type = Some(join_type);
        self.join_expr = Some(join_expr);
        self
    }

    /// The name this source is referenced by in expressions.
    pub fn alias_or_name(&self) -> &str {
        match &self.alias {
            Some(alias) => alias,
            None => &self.name,
        }
    }

    pub fn is_table(&self) -> bool {
        !self.name.is_empty() && self.source.is_none()
    }

    pub fn node_type(&self) -> NodeType {
        if self.join_type.is_some() || self.join_expr.is_some() {
            NodeType::SqlJoin
        } else {
            NodeType::SqlSource
        }
    }

    pub fn accept_sub<V: SubVisitor>(&self, visitor: &mut V) -> Result<V::Output> {
        if self.source.is_some() {
            visitor.visit_subselect(self)
        } else {
            visitor.visit_join(self)
        }
    }

    /// Derives the per-side join copy: records the fold direction,
    /// collects this side's equality join keys from the WHERE clause
    /// and every ON expression, and keeps the simple single-side WHERE
    /// conjuncts as a backend pre-filter. The full WHERE still runs in
    /// the pipeline; the pre-filter is an offer, not a transfer.
    pub fn rewrite(&self, fold: bool, stmt: &SqlSelect) -> SqlSource {
        let mut out = self.clone();
        out.fold = fold;
        out.filter = None;
        out.join_nodes = Vec::new();

        let me = self.alias_or_name();
        for source in &stmt.from {
            if let Some(expr) = &source.join_expr {
                collect_join_nodes(expr, me, &mut out.join_nodes);
            }
        }
        if let Some(where_clause) = &stmt.where_clause {
            if let Some(expr) = &where_clause.expr {
                collect_join_nodes(expr, me, &mut out.join_nodes);
                out.filter = push_down_filter(expr, me);
            }
        }
        out
    }
}

impl std::fmt::Display for SqlSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(join_type) = &self.join_type {
            write!(f, "{} JOIN ", join_type)?;
        }
        if let Some(sub) = &self.source {
            write!(f, "({})", sub)?;
        } else {
            f.write_str(&self.name)?;
        }
        if let Some(alias) = &self.alias {
            write!(f, " AS {}", alias)?;
        }
        if let Some(expr) = &self.join_expr {
            write!(f, " ON {}", expr)?;
        }
        Ok(())
    }
}

/// WHERE clause: either an expression or a sub-query (`x IN (SELECT
/// ...)`), never both.
#[derive(Debug, Clone)]
pub struct SqlWhere {
    pub pos: Pos,
    /// Operator tying a sub-query in, e.g. IN.
    pub op: Option<TokenType>,
    pub source: Option<Box<SqlSelect>>,
    pub expr: Option<Node>,
}

impl SqlWhere {
    pub fn from_expr(pos: Pos, expr: Node) -> SqlWhere {
        SqlWhere { pos, op: None, source: None, expr: Some(expr) }
    }

    pub fn subquery(pos: Pos, op: TokenType, source: SqlSelect) -> SqlWhere {
        SqlWhere { pos, op: Some(op), source: Some(Box::new(source)), expr: None }
    }

    pub fn node_type(&self) -> NodeType {
        NodeType::SqlWhere
    }

    pub fn check(&self) -> Result<()> {
        if let Some(expr) = &self.expr {
            expr.check()?;
        }
        if let Some(source) = &self.source {
            source.check()?;
        }
        Ok(())
    }
}

impl std::fmt::Display for SqlWhere {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.expr, &self.source) {
            (Some(expr), _) => write!(f, "{}", expr),
            (None, Some(source)) => match &self.op {
                Some(op) => write!(f, "{} ({})", op, source),
                None => write!(f, "({})", source),
            },
            (None, None) => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqlInsert {
    pub pos: Pos,
    pub table: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Node>>,
}

impl SqlInsert {
    pub fn check(&self) -> Result<()> {
        for row in &self.rows {
            for node in row {
                node.check()?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for SqlInsert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "INSERT INTO {}{}", self.table, values_clause(&self.columns, &self.rows))
    }
}

#[derive(Debug, Clone)]
pub struct SqlUpsert {
    pub pos: Pos,
    pub table: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Node>>,
}

impl SqlUpsert {
    pub fn check(&self) -> Result<()> {
        for row in &self.rows {
            for node in row {
                node.check()?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for SqlUpsert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UPSERT INTO {}{}", self.table, values_clause(&self.columns, &self.rows))
    }
}

fn values_clause(columns: &[Column], rows: &[Vec<Node>]) -> String {
    let mut out = String::new();
    if !columns.is_empty() {
        let names = columns.iter().map(|c| c.as_name()).collect::<Vec<_>>().join(", ");
        out.push_str(&format!(" ({})", names));
    }
    if !rows.is_empty() {
        let rendered = rows
            .iter()
            .map(|row| {
                let vals = row.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(", ");
                format!("({})", vals)
            })
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!(" VALUES {}", rendered));
    }
    out
}

#[derive(Debug, Clone)]
pub struct SqlUpdate {
    pub pos: Pos,
    pub table: String,
    pub values: Vec<(String, Node)>,
    pub where_clause: Option<SqlWhere>,
}

impl SqlUpdate {
    pub fn check(&self) -> Result<()> {
        for (_, node) in &self.values {
            node.check()?;
        }
        if let Some(where_clause) = &self.where_clause {
            where_clause.check()?;
        }
        Ok(())
    }
}

impl std::fmt::Display for SqlUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sets =
            self.values.iter().map(|(k, v)| format!("{} = {}", k, v)).collect::<Vec<_>>().join(", ");
        write!(f, "UPDATE {} SET {}", self.table, sets)?;
        if let Some(where_clause) = &self.where_clause {
            write!(f, " WHERE {}", where_clause)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SqlDelete {
    pub pos: Pos,
    pub table: String,
    pub where_clause: Option<SqlWhere>,
}

impl SqlDelete {
    pub fn check(&self) -> Result<()> {
        if let Some(where_clause) = &self.where_clause {
            where_clause.check()?;
        }
        Ok(())
    }
}

impl std::fmt::Display for SqlDelete {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DELETE FROM {}", self.table)?;
        if let Some(where_clause) = &self.where_clause {
            write!(f, " WHERE {}", where_clause)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SqlShow {
    pub pos: Pos,
    pub identity: String,
}

#[derive(Debug, Clone)]
pub struct SqlDescribe {
    pub pos: Pos,
    pub identity: String,
}

#[derive(Debug, Clone)]
pub struct PreparedStatement {
    pub pos: Pos,
    pub alias: String,
    pub statement: Box<Statement>,
}

/// Flattens nested AND chains into their conjuncts.
fn conjuncts<'a>(node: &'a Node, out: &mut Vec<&'a Node>) {
    match node {
        Node::Binary(b) if b.op.ttype == TokenType::And => {
            conjuncts(&b.left, out);
            conjuncts(&b.right, out);
        }
        _ => out.push(node),
    }
}

/// Collects this side's operands of cross-source equality conjuncts:
/// `u.id = o.user_id` contributes `u.id` to side `u` and `o.user_id`
/// to side `o`.
fn collect_join_nodes(expr: &Node, me: &str, out: &mut Vec<Node>) {
    let mut list = Vec::new();
    conjuncts(expr, &mut list);
    for node in list {
        let b = match node {
            Node::Binary(b) if b.op.ttype == TokenType::Eq => b,
            _ => continue,
        };
        let (left, right) = match (b.left.as_ref(), b.right.as_ref()) {
            (Node::Identity(l), Node::Identity(r)) => (l, r),
            _ => continue,
        };
        let (lq, _, l_ok) = left.left_right();
        let (rq, _, r_ok) = right.left_right();
        if !l_ok || !r_ok || lq == rq {
            continue;
        }
        if lq == me {
            out.push(Node::Identity(left.clone()));
        } else if rq == me {
            out.push(Node::Identity(right.clone()));
        }
    }
}

/// Keeps the WHERE conjuncts one side can apply alone: simple binaries
/// whose identities are all qualified with this side's name, re-joined
/// with AND.
fn push_down_filter(expr: &Node, me: &str) -> Option<Node> {
    let mut list = Vec::new();
    conjuncts(expr, &mut list);
    let kept = list
        .into_iter()
        .filter(|node| match node {
            Node::Binary(b) => b.is_simple() && references_only(node, me),
            _ => false,
        })
        .cloned()
        .collect::<Vec<_>>();
    kept.into_iter().reduce(|acc, node| {
        Node::Binary(BinaryNode::new(Token::op(TokenType::And, 0), acc, node))
    })
}

/// True when every identity under the node is qualified with `me`.
fn references_only(node: &Node, me: &str) -> bool {
    let mut idents: Vec<&IdentityNode> = Vec::new();
    collect_identities(node, &mut idents);
    idents.iter().all(|id| {
        let (qualifier, _, qualified) = id.left_right();
        qualified && qualifier == me
    })
}

fn collect_identities<'a>(node: &'a Node, out: &mut Vec<&'a IdentityNode>) {
    match node {
        Node::Identity(id) => out.push(id),
        Node::String(_) | Node::Number(_) | Node::Null(_) => {}
        Node::Unary(n) => collect_identities(&n.arg, out),
        Node::Binary(n) => {
            collect_identities(&n.left, out);
            collect_identities(&n.right, out);
        }
        Node::Tri(n) => {
            for arg in &n.args {
                collect_identities(arg, out);
            }
        }
        Node::MultiArg(n) => {
            for arg in &n.args {
                collect_identities(arg, out);
            }
        }
        Node::Func(n) => {
            for arg in &n.args {
                collect_identities(arg, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::node::tests::binary;
    use crate::sql::node::tests::ident;
    use crate::sql::node::tests::number;
    use crate::sql::node::tests::string;
    use crate::sql::node::FuncNode;

    pub fn select_one_table(raw: &str, table: &str) -> SqlSelect {
        let mut stmt = SqlSelect::new(0);
        stmt.raw = raw.to_string();
        stmt.star = true;
        stmt.from = vec![SqlSource::table(0, table)];
        stmt
    }

    #[test]
    fn test_select_display() {
        let mut stmt = SqlSelect::new(0);
        stmt.columns = vec![
            Column::from_expr(0, ident("name")),
            Column::from_expr(0, {
                let mut f = FuncNode::try_new(0, "upper").unwrap();
                f.push_arg(ident("name"));
                Node::Func(f)
            })
            .with_alias("shout"),
        ];
        stmt.from = vec![SqlSource::table(0, "users")];
        stmt.where_clause =
            Some(SqlWhere::from_expr(0, binary(TokenType::Gt, ident("age"), number("21"))));
        assert_eq!(
            "SELECT name, upper(name) AS shout FROM users WHERE age > 21",
            stmt.to_string()
        );

        let star = select_one_table("", "users");
        assert_eq!("SELECT * FROM users", star.to_string());
    }

    #[test]
    fn test_column_as_name() {
        let col = Column::from_expr(0, ident("name"));
        assert_eq!("name", col.as_name());

        let col = Column::from_expr(0, ident("name")).with_alias("who");
        assert_eq!("who", col.as_name());

        let mut f = FuncNode::try_new(0, "upper").unwrap();
        f.push_arg(ident("name"));
        let col = Column::from_expr(0, Node::Func(f));
        assert_eq!("upper_name", col.as_name());
        assert_eq!("name", col.source_field);
    }

    #[test]
    fn test_statement_accept_is_exhaustive() -> Result<()> {
        struct KindVisitor;
        impl Visitor for KindVisitor {
            type Output = &'static str;

            fn visit_select(&mut self, _: &SqlSelect) -> Result<&'static str> {
                Ok("select")
            }
            fn visit_insert(&mut self, _: &SqlInsert) -> Result<&'static str> {
                Ok("insert")
            }
            fn visit_update(&mut self, _: &SqlUpdate) -> Result<&'static str> {
                Ok("update")
            }
            fn visit_upsert(&mut self, _: &SqlUpsert) -> Result<&'static str> {
                Ok("upsert")
            }
            fn visit_delete(&mut self, _: &SqlDelete) -> Result<&'static str> {
                Ok("delete")
            }
            fn visit_show(&mut self, _: &SqlShow) -> Result<&'static str> {
                Ok("show")
            }
            fn visit_describe(&mut self, _: &SqlDescribe) -> Result<&'static str> {
                Ok("describe")
            }
            fn visit_prepared(&mut self, _: &PreparedStatement) -> Result<&'static str> {
                Ok("prepared")
            }
        }

        let mut v = KindVisitor;
        let select = Statement::Select(select_one_table("", "t"));
        assert_eq!("select", select.accept(&mut v)?);
        assert_eq!(NodeType::SqlSelect, select.node_type());

        let insert = Statement::Insert(SqlInsert {
            pos: 0,
            table: "t".to_string(),
            columns: vec![],
            rows: vec![],
        });
        assert_eq!("insert", insert.accept(&mut v)?);
        assert_eq!(NodeType::SqlInsert, insert.node_type());

        let show = Statement::Show(SqlShow { pos: 0, identity: "tables".to_string() });
        assert_eq!("show", show.accept(&mut v)?);
        Ok(())
    }

    fn two_table_stmt() -> SqlSelect {
        // SELECT * FROM users AS u, orders AS o
        //  WHERE u.id = o.user_id AND u.name = "bob" AND o.total > 10
        let mut stmt = SqlSelect::new(0);
        stmt.star = true;
        stmt.from = vec![
            SqlSource::table(0, "users").with_alias("u"),
            SqlSource::table(0, "orders").with_alias("o"),
        ];
        let join = binary(TokenType::Eq, ident("u.id"), ident("o.user_id"));
        let name = binary(TokenType::Eq, ident("u.name"), string("bob"));
        let total = binary(TokenType::Gt, ident("o.total"), number("10"));
        let expr = binary(TokenType::And, binary(TokenType::And, join, name), total);
        stmt.where_clause = Some(SqlWhere::from_expr(0, expr));
        stmt
    }

    #[test]
    fn test_rewrite_collects_join_nodes() {
        let stmt = two_table_stmt();
        let left = stmt.from[0].rewrite(true, &stmt);
        let right = stmt.from[1].rewrite(false, &stmt);

        assert!(left.fold);
        assert!(!right.fold);

        let names = |side: &SqlSource| {
            side.join_nodes.iter().map(|n| n.to_string()).collect::<Vec<_>>()
        };
        assert_eq!(vec!["u.id"], names(&left));
        assert_eq!(vec!["o.user_id"], names(&right));
    }

    #[test]
    fn test_rewrite_keeps_single_side_filters() {
        let stmt = two_table_stmt();
        let left = stmt.from[0].rewrite(true, &stmt);
        let right = stmt.from[1].rewrite(false, &stmt);

        // u.name = "bob" is simple and single-side, so it is offered
        // to the backend; o.total > 10 compares a number and is not.
        assert_eq!("u.name = bob", left.filter.as_ref().map(|n| n.to_string()).unwrap());
        assert!(right.filter.is_none());
    }

    #[test]
    fn test_rewrite_uses_on_expression() {
        let mut stmt = SqlSelect::new(0);
        stmt.star = true;
        stmt.from = vec![
            SqlSource::table(0, "users").with_alias("u"),
            SqlSource::table(0, "orders").with_alias("o").with_join(
                TokenType::Inner,
                binary(TokenType::Eq, ident("u.id"), ident("o.user_id")),
            ),
        ];
        let left = stmt.from[0].rewrite(true, &stmt);
        let right = stmt.from[1].rewrite(false, &stmt);
        assert_eq!(1, left.join_nodes.len());
        assert_eq!(1, right.join_nodes.len());
        assert_eq!(NodeType::SqlJoin, stmt.from[1].node_type());
        assert_eq!(NodeType::SqlSource, stmt.from[0].node_type());
        assert_eq!(
            "SELECT * FROM users AS u INNER JOIN orders AS o ON u.id = o.user_id",
            stmt.to_string()
        );
    }

    #[test]
    fn test_where_shapes() {
        let w = SqlWhere::from_expr(0, binary(TokenType::Gt, ident("a"), number("1")));
        assert!(w.expr.is_some());
        assert!(w.source.is_none());

        let sub = select_one_table("", "orders");
        let w = SqlWhere::subquery(0, TokenType::In, sub);
        assert!(w.expr.is_none());
        assert!(w.source.is_some());
        assert_eq!(NodeType::SqlWhere, w.node_type());
        assert_eq!("IN (SELECT * FROM orders)", w.to_string());
    }
}
