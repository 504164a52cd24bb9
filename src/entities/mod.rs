pub mod user;
pub mod category;
pub mod product;
pub mod cart;
pub mod order;
pub mod order_item;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use chrono::Utc;
use sea_orm::{
    sea_query::{Index, TableCreateStatement}, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, Schema, Set, TransactionTrait,
};
use tracing::info;

use crate::config::AdminSeed;
use crate::entities::{
    cart::Entity as Cart,
    category::Entity as Category,
    order::Entity as Order,
    order_item::Entity as OrderItem,
    product::Entity as Product,
    user::Entity as User,
};

/// Creates every table that does not exist yet, parents before children.
pub async fn setup_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let statements: [TableCreateStatement; 6] = [
        schema.create_table_from_entity(User),
        schema.create_table_from_entity(Category),
        schema.create_table_from_entity(Product),
        schema.create_table_from_entity(Cart),
        schema.create_table_from_entity(Order),
        schema.create_table_from_entity(OrderItem),
    ];

    for mut statement in statements {
        statement.if_not_exists();
        db.execute(backend.build(&statement)).await?;
    }

    // one cart line per user and product
    let cart_line = Index::create()
        .name("idx_cart_user_product")
        .table(Cart)
        .col(cart::Column::UserId)
        .col(cart::Column::ProductId)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(backend.build(&cart_line)).await?;

    Ok(())
}

pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| err.to_string())
}

#[derive(thiserror::Error, Debug)]
pub enum SeedError {
    #[error("Failed to hash admin password: {0}")]
    PasswordHash(String),
    #[error(transparent)]
    Db(#[from] DbErr),
}

/// Makes sure the configured administrator exists. Existing accounts are left
/// untouched so restarts never reset a changed password.
pub async fn seed_admin(db: &DatabaseConnection, seed: &AdminSeed) -> Result<(), SeedError> {
    let txn = db.begin().await?;

    let existing = User::find()
        .filter(user::Column::Email.eq(seed.email.as_str()))
        .one(&txn)
        .await?;

    if existing.is_some() {
        txn.rollback().await?;
        return Ok(());
    }

    let password = hash_password(&seed.password).map_err(SeedError::PasswordHash)?;

    let admin = user::ActiveModel {
        first_name: Set("Store".to_owned()),
        last_name: Set("Admin".to_owned()),
        email: Set(seed.email.clone()),
        password: Set(password),
        role: Set(user::Role::Admin),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    User::insert(admin).exec(&txn).await?;
    txn.commit().await?;

    info!(email = %seed.email, "Seeded administrator account");
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use sea_orm::{ActiveModelTrait, Database};

    pub async fn memory_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("Failed to open in-memory database");
        setup_schema(&db).await.expect("Failed to create schema");
        db
    }

    pub async fn insert_user(db: &DatabaseConnection, email: &str) -> user::Model {
        user::ActiveModel {
            first_name: Set("Test".to_owned()),
            last_name: Set("User".to_owned()),
            email: Set(email.to_owned()),
            password: Set("not-a-hash".to_owned()),
            role: Set(user::Role::Customer),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("Failed to insert user")
    }

    pub async fn insert_category(db: &DatabaseConnection, name: &str) -> category::Model {
        category::ActiveModel {
            name: Set(name.to_owned()),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("Failed to insert category")
    }

    pub async fn insert_product(
        db: &DatabaseConnection,
        category_id: i32,
        name: &str,
        price: f64,
        stock: i32,
    ) -> product::Model {
        product::ActiveModel {
            name: Set(name.to_owned()),
            description: Set(format!("{name} description")),
            price: Set(price),
            stock: Set(stock),
            image: Set(Some(format!("/img/{name}.png"))),
            category_id: Set(category_id),
            featured: Set(false),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("Failed to insert product")
    }

    pub async fn insert_cart_line(
        db: &DatabaseConnection,
        user_id: i32,
        product_id: i32,
        quantity: i32,
    ) -> cart::Model {
        cart::ActiveModel {
            user_id: Set(user_id),
            product_id: Set(product_id),
            quantity: Set(quantity),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("Failed to insert cart line")
    }
}
