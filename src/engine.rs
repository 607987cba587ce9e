//! Template engine facade.
//!
//! Bundles a dialect, an expression evaluator and a cache of parsed
//! templates keyed by template text.
//!
//! ```rust,ignore
//! let engine = TemplateEngine::new(Dialect::Postgres);
//! let sql = engine
//!     .query("select /*%expand*/* from emp where name = /*name*/'x'")
//!     .bind("name", "Smith")
//!     .expand(&emp_meta)
//!     .render()?;
//! ```

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::config::Config;
use crate::dialect::{DEFAULT_ESCAPE_CHAR, Dialect};
use crate::entity::EntityMeta;
use crate::error::TwoWayResult;
use crate::expr::{DefaultResolver, ExprContext, ExprEvaluator};
use crate::sql::{self, BoundSql, SqlNode, SqlRenderer};
use crate::value::{TypedValue, Value};

#[derive(Debug, Clone)]
pub struct TemplateEngine {
    dialect: Dialect,
    evaluator: Arc<ExprEvaluator>,
    cache: Option<Arc<DashMap<String, Arc<SqlNode>>>>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new(Dialect::default())
    }
}

impl TemplateEngine {
    /// Engine with template caching and the default escape character.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            evaluator: Arc::new(ExprEvaluator::new(Arc::new(DefaultResolver::new(DEFAULT_ESCAPE_CHAR)))),
            cache: Some(Arc::new(DashMap::new())),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            dialect: config.dialect,
            evaluator: Arc::new(ExprEvaluator::new(Arc::new(DefaultResolver::new(config.escape_char())))),
            cache: config.cache_templates.then(|| Arc::new(DashMap::new())),
        }
    }

    /// Replace the evaluator, e.g. to register extension members.
    pub fn with_evaluator(mut self, evaluator: ExprEvaluator) -> Self {
        self.evaluator = Arc::new(evaluator);
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn evaluator(&self) -> &ExprEvaluator {
        &self.evaluator
    }

    /// Parse `template`, reusing a cached AST when there is one.
    pub fn parse(&self, template: &str) -> TwoWayResult<Arc<SqlNode>> {
        let Some(cache) = &self.cache else {
            return Ok(Arc::new(sql::parse(template)?));
        };
        if let Some(ast) = cache.get(template) {
            return Ok(ast.clone());
        }
        let ast = Arc::new(sql::parse(template)?);
        debug!(cached = cache.len() + 1, "template cached");
        Ok(cache.entry(template.to_string()).or_insert(ast).clone())
    }

    pub fn cached_templates(&self) -> usize {
        self.cache.as_ref().map_or(0, |c| c.len())
    }

    pub fn query(&self, template: &str) -> TemplateQuery<'_> {
        TemplateQuery {
            engine: self,
            template: template.to_string(),
            ctx: ExprContext::new(),
            columns: None,
        }
    }

    pub fn render(&self, template: &str, ctx: &ExprContext) -> TwoWayResult<BoundSql> {
        self.render_node(&*self.parse(template)?, ctx, None)
    }

    /// `select count(*) from (<template>) t_`
    pub fn render_count(&self, template: &str, ctx: &ExprContext) -> TwoWayResult<BoundSql> {
        let ast = sql::rewrite_for_count(&*self.parse(template)?);
        self.render_node(&ast, ctx, None)
    }

    pub fn render_paginated(
        &self,
        template: &str,
        ctx: &ExprContext,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> TwoWayResult<BoundSql> {
        let ast = sql::rewrite_for_pagination(&*self.parse(template)?, limit, offset);
        self.render_node(&ast, ctx, None)
    }

    fn render_node(&self, ast: &SqlNode, ctx: &ExprContext, columns: Option<&[String]>) -> TwoWayResult<BoundSql> {
        let renderer = SqlRenderer::new(&self.evaluator, self.dialect);
        match columns {
            Some(columns) => {
                let expander = |prefix: &str| -> Vec<String> { columns.iter().map(|c| format!("{}{}", prefix, c)).collect() };
                renderer.with_expander(&expander).render(ast, ctx)
            }
            None => renderer.render(ast, ctx),
        }
    }
}

/// A template plus its bindings.
pub struct TemplateQuery<'e> {
    engine: &'e TemplateEngine,
    template: String,
    ctx: ExprContext,
    columns: Option<Vec<String>>,
}

impl<'e> TemplateQuery<'e> {
    /// Bind a context value.
    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.ctx.insert(name, value);
        self
    }

    /// Bind a context value with an explicit type, e.g. a typed null.
    pub fn bind_typed(mut self, name: &str, value: TypedValue) -> Self {
        self.ctx.insert_typed(name, value);
        self
    }

    /// Bind every value of an existing context.
    pub fn context(mut self, ctx: ExprContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// Columns that `/*%expand*/` writes, before any alias prefix.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Let `/*%expand*/` write the entity's leaf columns.
    pub fn expand(self, meta: &EntityMeta) -> Self {
        let columns = meta.columns("");
        self.columns(columns)
    }

    pub fn render(&self) -> TwoWayResult<BoundSql> {
        let ast = self.engine.parse(&self.template)?;
        self.engine.render_node(&ast, &self.ctx, self.columns.as_deref())
    }

    pub fn render_count(&self) -> TwoWayResult<BoundSql> {
        let ast = sql::rewrite_for_count(&*self.engine.parse(&self.template)?);
        self.engine.render_node(&ast, &self.ctx, self.columns.as_deref())
    }

    pub fn render_paginated(&self, limit: Option<u64>, offset: Option<u64>) -> TwoWayResult<BoundSql> {
        let ast = sql::rewrite_for_pagination(&*self.engine.parse(&self.template)?, limit, offset);
        self.engine.render_node(&ast, &self.ctx, self.columns.as_deref())
    }
}
