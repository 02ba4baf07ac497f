//! Cart model and the rules for mutating it.
//!
//! A [`Cart`] holds at most one [`CartItem`] per [`ItemKey`] and never a line
//! with a quantity below one. All mutations go through the methods here so
//! those rules hold no matter which component drives the cart.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{CurrencyCode, ItemKey, Price, Quantity, QuantityError, UserId};

/// Errors returned by cart mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CartRuleError {
    /// The targeted line does not exist.
    #[error("item not found in cart: {0}")]
    ItemNotFound(ItemKey),
    /// The requested quantity is out of range.
    #[error(transparent)]
    Quantity(#[from] QuantityError),
    /// The price is in another currency than the cart's lines.
    #[error("cart is priced in {expected:?}, item is priced in {found:?}")]
    CurrencyMismatch {
        /// Currency of the lines already in the cart.
        expected: CurrencyCode,
        /// Currency of the rejected price.
        found: CurrencyCode,
    },
}

/// Presentation data attached to a cart line. Opaque to the cart rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayMeta {
    /// Product name.
    #[serde(default)]
    pub name: String,
    /// Product image URL.
    #[serde(default)]
    pub image: Option<String>,
}

impl DisplayMeta {
    /// Image shown when a product has none.
    pub const PLACEHOLDER_IMAGE: &'static str = "/placeholder.svg";

    /// Create display data for a product.
    #[must_use]
    pub fn new(name: impl Into<String>, image: Option<String>) -> Self {
        Self {
            name: name.into(),
            image,
        }
    }

    /// The product image, or the placeholder when missing or blank.
    #[must_use]
    pub fn image_or_placeholder(&self) -> &str {
        self.image
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(Self::PLACEHOLDER_IMAGE)
    }
}

/// A single cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Product identity.
    pub item_key: ItemKey,
    /// Number of units, always at least one.
    pub quantity: Quantity,
    /// Price of one unit.
    pub unit_price: Price,
    /// Name and image for display.
    #[serde(default)]
    pub display: DisplayMeta,
}

impl CartItem {
    /// Create a cart line.
    #[must_use]
    pub const fn new(
        item_key: ItemKey,
        quantity: Quantity,
        unit_price: Price,
        display: DisplayMeta,
    ) -> Self {
        Self {
            item_key,
            quantity,
            unit_price,
            display,
        }
    }

    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price.times(self.quantity.get())
    }
}

/// Who a cart belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CartOwner {
    /// A visitor that has not logged in. The ID scopes the cart to this
    /// browsing session only.
    Anonymous {
        /// Random scope identifier.
        #[serde(rename = "cartId")]
        cart_id: Uuid,
    },
    /// A logged-in customer.
    Customer {
        /// The customer's ID.
        #[serde(rename = "userId")]
        user_id: UserId,
    },
}

impl CartOwner {
    /// A fresh anonymous scope.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::Anonymous {
            cart_id: Uuid::new_v4(),
        }
    }

    /// The owning customer, if any.
    #[must_use]
    pub const fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Anonymous { .. } => None,
            Self::Customer { user_id } => Some(user_id),
        }
    }

    /// Whether this is an anonymous scope.
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous { .. })
    }
}

impl Default for CartOwner {
    fn default() -> Self {
        Self::anonymous()
    }
}

/// Outcome of [`Cart::set_quantity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuantityChange {
    /// The line now has the requested quantity.
    Updated(CartItem),
    /// The requested quantity was zero or negative and the line was removed.
    Removed(CartItem),
}

/// A shopping cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CartRecord", rename_all = "camelCase")]
pub struct Cart {
    owner: CartOwner,
    items: Vec<CartItem>,
}

/// Serialized shape of a cart. Duplicate keys in stored data are folded
/// together on load so the uniqueness rule holds for restored carts too.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartRecord {
    #[serde(default)]
    owner: CartOwner,
    #[serde(default)]
    items: Vec<CartItem>,
}

impl From<CartRecord> for Cart {
    fn from(record: CartRecord) -> Self {
        let mut cart = Self::new(record.owner);
        cart.absorb(record.items);
        cart
    }
}

impl Cart {
    /// An empty cart for the given owner.
    #[must_use]
    pub const fn new(owner: CartOwner) -> Self {
        Self {
            owner,
            items: Vec::new(),
        }
    }

    /// An empty cart in a fresh anonymous scope.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::new(CartOwner::anonymous())
    }

    /// A cart built from a list of lines, folding duplicate keys.
    #[must_use]
    pub fn from_items(owner: CartOwner, items: Vec<CartItem>) -> Self {
        let mut cart = Self::new(owner);
        cart.absorb(items);
        cart
    }

    /// The cart owner.
    #[must_use]
    pub const fn owner(&self) -> &CartOwner {
        &self.owner
    }

    /// Lines in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Look up a line by key.
    #[must_use]
    pub fn get(&self, key: &ItemKey) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.item_key == key)
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of all line quantities (the badge count).
    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|item| item.quantity.get()).sum()
    }

    /// Currency of the cart's lines, `None` while empty.
    #[must_use]
    pub fn currency(&self) -> Option<CurrencyCode> {
        self.items
            .first()
            .map(|item| item.unit_price.currency_code())
    }

    /// Sum of the line totals, one entry per currency in first-seen order.
    ///
    /// [`Cart::add`] keeps a cart to a single currency; more than one entry
    /// only appears when lines in other currencies were merged in from
    /// stored or server data.
    #[must_use]
    pub fn subtotals(&self) -> Vec<Price> {
        let mut totals: Vec<Price> = Vec::new();
        for item in &self.items {
            let line = item.line_total();
            match totals
                .iter_mut()
                .find(|total| total.currency_code() == line.currency_code())
            {
                Some(total) => *total = total.checked_add(line).unwrap_or(*total),
                None => totals.push(line),
            }
        }
        totals
    }

    /// Add units of a product.
    ///
    /// An existing line accumulates the quantity and takes the latest price
    /// and display data; otherwise a new line is appended.
    ///
    /// # Errors
    ///
    /// Returns `CartRuleError::Quantity` if the accumulated quantity would
    /// exceed [`Quantity::MAX`] and `CartRuleError::CurrencyMismatch` if the
    /// price is not in the cart's currency. The cart is unchanged in both
    /// cases.
    pub fn add(
        &mut self,
        item_key: ItemKey,
        quantity: Quantity,
        unit_price: Price,
        display: DisplayMeta,
    ) -> Result<CartItem, CartRuleError> {
        if let Some(expected) = self.currency()
            && expected != unit_price.currency_code()
        {
            return Err(CartRuleError::CurrencyMismatch {
                expected,
                found: unit_price.currency_code(),
            });
        }

        if let Some(line) = self.items.iter_mut().find(|line| line.item_key == item_key) {
            line.quantity = line.quantity.checked_add(quantity)?;
            line.unit_price = unit_price;
            line.display = display;
            return Ok(line.clone());
        }

        let line = CartItem::new(item_key, quantity, unit_price, display);
        self.items.push(line.clone());
        Ok(line)
    }

    /// Set a line's quantity. A requested quantity of zero or below removes
    /// the line.
    ///
    /// # Errors
    ///
    /// Returns `CartRuleError::ItemNotFound` if the key is not in the cart,
    /// or `CartRuleError::Quantity` if the quantity exceeds the maximum.
    pub fn set_quantity(
        &mut self,
        item_key: &ItemKey,
        requested: i64,
    ) -> Result<QuantityChange, CartRuleError> {
        let index = self
            .position(item_key)
            .ok_or_else(|| CartRuleError::ItemNotFound(item_key.clone()))?;

        if requested <= 0 {
            return Ok(QuantityChange::Removed(self.items.remove(index)));
        }

        let quantity = Quantity::new(requested)?;
        let line = self
            .items
            .get_mut(index)
            .ok_or_else(|| CartRuleError::ItemNotFound(item_key.clone()))?;
        line.quantity = quantity;
        Ok(QuantityChange::Updated(line.clone()))
    }

    /// Remove a line. Removing an absent key is a no-op.
    pub fn remove(&mut self, item_key: &ItemKey) -> Option<CartItem> {
        self.position(item_key).map(|index| self.items.remove(index))
    }

    /// Remove every line, keeping the owner.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Move the cart to another owner, keeping its lines.
    pub fn reassign(&mut self, owner: CartOwner) {
        self.owner = owner;
    }

    /// Fold lines into the cart, accumulating quantities for keys already
    /// present. Accumulated quantities are capped at [`Quantity::MAX`].
    pub fn absorb(&mut self, items: impl IntoIterator<Item = CartItem>) {
        for item in items {
            if let Some(line) = self
                .items
                .iter_mut()
                .find(|line| line.item_key == item.item_key)
            {
                line.quantity = line
                    .quantity
                    .checked_add(item.quantity)
                    .unwrap_or(Quantity::CEILING);
            } else {
                self.items.push(item);
            }
        }
    }

    fn position(&self, item_key: &ItemKey) -> Option<usize> {
        self.items.iter().position(|item| &item.item_key == item_key)
    }
}
