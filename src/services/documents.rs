//! Structured item views for print and label output.
//!
//! The core supplies grouped data only; rendering (PDF, labels) is a
//! collaborator behind this boundary.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    entities::{delivery, kitchen_sheet, kitchen_sheet_item, order_item, product},
    errors::ServiceError,
};

#[derive(Debug, Clone, Serialize)]
pub struct DocumentLine {
    pub product_id: Uuid,
    pub name: String,
    pub sku: String,
    pub unit: String,
    pub quantity: i32,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct CategoryGroup {
    pub category: String,
    pub lines: Vec<DocumentLine>,
}

#[derive(Debug, Serialize)]
pub struct ExpiryGroup {
    /// `None` groups lines with no recorded expiry, ordered last.
    pub expiry_date: Option<NaiveDate>,
    pub lines: Vec<DocumentLine>,
}

const UNCATEGORIZED: &str = "uncategorized";

/// Groups lines by product category, alphabetically, uncategorized last.
pub fn group_by_category(lines: Vec<(Option<String>, DocumentLine)>) -> Vec<CategoryGroup> {
    let mut grouped: BTreeMap<String, Vec<DocumentLine>> = BTreeMap::new();
    let mut uncategorized = Vec::new();

    for (category, line) in lines {
        match category {
            Some(category) => grouped.entry(category).or_default().push(line),
            None => uncategorized.push(line),
        }
    }

    let mut groups: Vec<CategoryGroup> = grouped
        .into_iter()
        .map(|(category, lines)| CategoryGroup { category, lines })
        .collect();
    if !uncategorized.is_empty() {
        groups.push(CategoryGroup {
            category: UNCATEGORIZED.to_string(),
            lines: uncategorized,
        });
    }
    groups
}

/// Groups lines by expiry date, soonest first, no-expiry last.
pub fn group_by_expiry(lines: Vec<DocumentLine>) -> Vec<ExpiryGroup> {
    let mut dated: BTreeMap<NaiveDate, Vec<DocumentLine>> = BTreeMap::new();
    let mut undated = Vec::new();

    for line in lines {
        match line.expiry_date {
            Some(date) => dated.entry(date).or_default().push(line),
            None => undated.push(line),
        }
    }

    let mut groups: Vec<ExpiryGroup> = dated
        .into_iter()
        .map(|(date, lines)| ExpiryGroup {
            expiry_date: Some(date),
            lines,
        })
        .collect();
    if !undated.is_empty() {
        groups.push(ExpiryGroup {
            expiry_date: None,
            lines: undated,
        });
    }
    groups
}

#[derive(Clone)]
pub struct DocumentService {
    db: Arc<DatabaseConnection>,
}

impl DocumentService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Kitchen sheet items grouped by product category, for the preparation
    /// floor.
    pub async fn kitchen_sheet_by_category(
        &self,
        sheet_id: Uuid,
    ) -> Result<Vec<CategoryGroup>, ServiceError> {
        let lines = self.kitchen_sheet_lines(sheet_id).await?;
        Ok(group_by_category(lines))
    }

    /// Kitchen sheet items grouped by expiry date, for labeling.
    pub async fn kitchen_sheet_by_expiry(
        &self,
        sheet_id: Uuid,
    ) -> Result<Vec<ExpiryGroup>, ServiceError> {
        let lines = self.kitchen_sheet_lines(sheet_id).await?;
        Ok(group_by_expiry(lines.into_iter().map(|(_, line)| line).collect()))
    }

    /// Delivery contents grouped by category, for the delivery note print.
    pub async fn delivery_by_category(
        &self,
        delivery_id: Uuid,
    ) -> Result<Vec<CategoryGroup>, ServiceError> {
        let db = &*self.db;

        let delivery = delivery::Entity::find_by_id(delivery_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Delivery", delivery_id))?;

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(delivery.order_id))
            .all(db)
            .await?;

        let products = self
            .load_products(items.iter().map(|i| i.product_id).collect())
            .await?;

        let lines = items
            .into_iter()
            .filter_map(|item| {
                products.get(&item.product_id).map(|product| {
                    (
                        product.category.clone(),
                        DocumentLine {
                            product_id: item.product_id,
                            name: product.name.clone(),
                            sku: product.sku.clone(),
                            unit: product.unit.clone(),
                            quantity: item.quantity,
                            batch_number: None,
                            expiry_date: None,
                        },
                    )
                })
            })
            .collect();

        Ok(group_by_category(lines))
    }

    async fn kitchen_sheet_lines(
        &self,
        sheet_id: Uuid,
    ) -> Result<Vec<(Option<String>, DocumentLine)>, ServiceError> {
        let db = &*self.db;

        kitchen_sheet::Entity::find_by_id(sheet_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Kitchen sheet", sheet_id))?;

        let items = kitchen_sheet_item::Entity::find()
            .filter(kitchen_sheet_item::Column::SheetId.eq(sheet_id))
            .all(db)
            .await?;

        let products = self
            .load_products(items.iter().map(|i| i.product_id).collect())
            .await?;

        Ok(items
            .into_iter()
            .filter_map(|item| {
                products.get(&item.product_id).map(|product| {
                    (
                        product.category.clone(),
                        DocumentLine {
                            product_id: item.product_id,
                            name: product.name.clone(),
                            sku: product.sku.clone(),
                            unit: product.unit.clone(),
                            quantity: item.quantity,
                            batch_number: item.batch_number.clone(),
                            expiry_date: item.expiry_date,
                        },
                    )
                })
            })
            .collect())
    }

    async fn load_products(
        &self,
        ids: Vec<Uuid>,
    ) -> Result<HashMap<Uuid, product::Model>, ServiceError> {
        Ok(product::Entity::find()
            .filter(product::Column::Id.is_in(ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn line(name: &str, expiry: Option<NaiveDate>) -> DocumentLine {
        DocumentLine {
            product_id: Uuid::new_v4(),
            name: name.to_string(),
            sku: name.to_uppercase(),
            unit: "each".to_string(),
            quantity: 1,
            batch_number: None,
            expiry_date: expiry,
        }
    }

    #[test]
    fn categories_sort_alphabetically_with_uncategorized_last() {
        let groups = group_by_category(vec![
            (Some("produce".into()), line("tomato", None)),
            (None, line("mystery", None)),
            (Some("dairy".into()), line("milk", None)),
            (Some("produce".into()), line("basil", None)),
        ]);

        let names: Vec<&str> = groups.iter().map(|g| g.category.as_str()).collect();
        assert_eq!(names, vec!["dairy", "produce", "uncategorized"]);
        assert_eq!(groups[1].lines.len(), 2);
    }

    #[test]
    fn expiry_groups_sort_soonest_first_with_undated_last() {
        let today = chrono::Utc::now().date_naive();
        let soon = today + Duration::days(1);
        let later = today + Duration::days(5);

        let groups = group_by_expiry(vec![
            line("b", Some(later)),
            line("a", Some(soon)),
            line("c", None),
        ]);

        assert_eq!(groups[0].expiry_date, Some(soon));
        assert_eq!(groups[1].expiry_date, Some(later));
        assert_eq!(groups[2].expiry_date, None);
    }

    #[test]
    fn empty_input_produces_no_groups() {
        assert!(group_by_category(vec![]).is_empty());
        assert!(group_by_expiry(vec![]).is_empty());
    }
}
