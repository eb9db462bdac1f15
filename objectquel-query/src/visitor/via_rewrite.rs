use crate::ast::{CompareOp, Expr, Identifier, Range, Retrieve, UnaryOp};
use crate::error::{Error, Result};
use objectquel_api::EntityMetadata;

/// Turns relation paths used as conditions in a database range's `VIA`
/// clause into explicit key equalities:
///
/// - owning side (`ManyToOne`, `OneToOne` without `mapped_by`):
///   `o.rel` becomes `o.<relation column> = t.<target key>`
/// - inverse side (`OneToMany`, `OneToOne` with `mapped_by = m`):
///   `o.rel` becomes `t.<m's relation column> = o.<owner key>`
///
/// `t` is the range over the relation's target entity. Comparisons already
/// written out are left alone.
pub fn rewrite_via(retrieve: &mut Retrieve, metadata: &dyn EntityMetadata) -> Result<()> {
    let ranges: Vec<(String, Option<String>)> = retrieve
        .ranges
        .iter()
        .map(|r| {
            let entity = r
                .as_database()
                .map(|db| metadata.normalize_entity_name(&db.entity.name));
            (r.alias().to_string(), entity)
        })
        .collect();

    for range in &mut retrieve.ranges {
        let Range::Database(db) = range else {
            continue;
        };
        let Some(via) = db.via.take() else {
            continue;
        };
        let rewriter = ViaRewriter {
            owner: &db.alias,
            ranges: &ranges,
            metadata,
        };
        db.via = Some(rewriter.rewrite(via)?);
    }
    Ok(())
}

struct ViaRewriter<'a> {
    owner: &'a str,
    ranges: &'a [(String, Option<String>)],
    metadata: &'a dyn EntityMetadata,
}

impl ViaRewriter<'_> {
    /// Only boolean positions are rewritten.
    fn rewrite(&self, expr: Expr) -> Result<Expr> {
        match expr {
            Expr::Logical { left, op, right } => Ok(Expr::Logical {
                left: Box::new(self.rewrite(*left)?),
                op,
                right: Box::new(self.rewrite(*right)?),
            }),
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(self.rewrite(*operand)?),
            }),
            Expr::Identifier(ident) => self.relation_condition(&ident),
            other => Ok(other),
        }
    }

    fn entity_of(&self, alias: &str) -> Option<&str> {
        self.ranges
            .iter()
            .find(|(a, _)| a == alias)
            .and_then(|(_, entity)| entity.as_deref())
    }

    /// Range that plays the target role: the VIA owner when it fits,
    /// otherwise the first other range over the target entity.
    fn counterpart(&self, source_alias: &str, target: &str) -> Option<&str> {
        if self.owner != source_alias && self.entity_of(self.owner) == Some(target) {
            return Some(self.owner);
        }
        self.ranges
            .iter()
            .find(|(alias, entity)| alias != source_alias && entity.as_deref() == Some(target))
            .map(|(alias, _)| alias.as_str())
    }

    fn relation_condition(&self, ident: &Identifier) -> Result<Expr> {
        let path = ident.complete_name();
        let (Some(alias), Some(property), 2) = (ident.range(), ident.tail_name(), ident.depth())
        else {
            return Err(Error::quel(format!(
                "VIA expects a relation path like 'alias.relation', got '{path}'"
            )));
        };
        let Some(source) = self.entity_of(alias) else {
            return Err(Error::quel(format!(
                "VIA path '{path}' does not start at a database range"
            )));
        };
        let Some(relation) = self.metadata.relation(source, &property) else {
            return Err(Error::quel(format!("'{path}' is not a relation")));
        };
        let target = self.metadata.normalize_entity_name(&relation.target_entity);
        let Some(counterpart) = self.counterpart(alias, &target) else {
            return Err(Error::quel(format!(
                "VIA '{path}' needs a range over '{target}'"
            )));
        };

        if relation.is_owning_side() {
            let target_key = self.key_of(&target)?;
            let column = relation.relation_column.unwrap_or_else(|| target_key.clone());
            return Ok(key_equality(alias, &column, counterpart, &target_key));
        }

        let Some(mapped_by) = relation.mapped_by else {
            return Err(Error::quel(format!(
                "Relation '{path}' has no mapped_by property"
            )));
        };
        let Some(inverse) = self.metadata.relation(&target, &mapped_by) else {
            return Err(Error::quel(format!(
                "'{target}.{mapped_by}' referenced by '{path}' is not a relation"
            )));
        };
        let owner_key = self.key_of(source)?;
        let column = inverse.relation_column.unwrap_or_else(|| owner_key.clone());
        Ok(key_equality(counterpart, &column, alias, &owner_key))
    }

    fn key_of(&self, entity: &str) -> Result<String> {
        self.metadata
            .primary_key(entity)
            .ok_or_else(|| Error::quel(format!("Entity '{entity}' has no identifier key")))
    }
}

fn key_equality(left_alias: &str, left: &str, right_alias: &str, right: &str) -> Expr {
    Expr::compare(
        Expr::Identifier(Identifier::property(left_alias, left)),
        CompareOp::Eq,
        Expr::Identifier(Identifier::property(right_alias, right)),
    )
}
