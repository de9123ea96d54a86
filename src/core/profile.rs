//! Record registration and the process-wide profile cache
//!
//! A [`Record`] lists its settable members once in [`Record::describe`]. The
//! resulting [`TypeProfile`] is built on first use and shared for the rest of
//! the process.
//!
//! ```
//! use rust_sql_pool::{ProfileBuilder, Record, TypeProfile, SqlValue};
//!
//! #[derive(Default)]
//! struct Data {
//!     id: i64,
//!     value: String,
//! }
//!
//! impl Record for Data {
//!     fn describe(profile: &mut ProfileBuilder<Self>) {
//!         profile.field("id", |d: &mut Data, v: i64| d.id = v);
//!         profile.field("value", |d: &mut Data, v: String| d.value = v).alias("name");
//!     }
//! }
//!
//! let data: Data = TypeProfile::<Data>::get()
//!     .populate([("id".to_string(), SqlValue::Int(3)), ("name".to_string(), "durian".into())])
//!     .unwrap();
//! assert_eq!(data.id, 3);
//! assert_eq!(data.value, "durian");
//! ```

use crate::core::convert::TypeConverter;
use crate::core::error::Result;
use crate::core::types::{FromSqlValue, SqlType};
use crate::core::value::SqlValue;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// A type that query rows can be mapped into
pub trait Record: Default + Send + 'static {
    /// Register the members that incoming columns may set
    fn describe(profile: &mut ProfileBuilder<Self>);
}

type Apply<T> = Box<dyn Fn(&mut T, &str, SqlValue) -> Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberKind {
    Field,
    Setter,
}

/// One settable member of a record
pub struct Member<T> {
    name: String,
    target: SqlType,
    apply: Apply<T>,
}

impl<T> Member<T> {
    /// Registered name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type incoming values are converted to
    pub fn target(&self) -> &SqlType {
        &self.target
    }
}

struct Registration<T> {
    kind: MemberKind,
    alias: Option<String>,
    ignored: bool,
    member: Member<T>,
}

/// Collects member registrations for one record type
pub struct ProfileBuilder<T> {
    registrations: Vec<Registration<T>>,
}

/// Handle for attaching hints to a member just registered
pub struct MemberHint<'a, T> {
    registration: &'a mut Registration<T>,
}

impl<T> MemberHint<'_, T> {
    /// Also match columns called `alias`; alias matches win over name matches
    pub fn alias(self, alias: &str) -> Self {
        self.registration.alias = Some(alias.to_string());
        self
    }

    /// Never set this member from query results
    pub fn ignore(self) -> Self {
        self.registration.ignored = true;
        self
    }
}

impl<T: 'static> ProfileBuilder<T> {
    fn new() -> Self {
        Self {
            registrations: Vec::new(),
        }
    }

    /// Register a public field
    pub fn field<V, F>(&mut self, name: &str, set: F) -> MemberHint<'_, T>
    where
        V: FromSqlValue + 'static,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        self.register(MemberKind::Field, name, set)
    }

    /// Register a setter method
    ///
    /// Field registrations take precedence over setters with the same name.
    pub fn setter<V, F>(&mut self, name: &str, set: F) -> MemberHint<'_, T>
    where
        V: FromSqlValue + 'static,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        self.register(MemberKind::Setter, name, set)
    }

    fn register<V, F>(&mut self, kind: MemberKind, name: &str, set: F) -> MemberHint<'_, T>
    where
        V: FromSqlValue + 'static,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let apply: Apply<T> = Box::new(move |record, member, value| {
            let converted = TypeConverter::convert::<V>(member, value)?;
            set(record, converted);
            Ok(())
        });
        self.registrations.push(Registration {
            kind,
            alias: None,
            ignored: false,
            member: Member {
                name: name.to_string(),
                target: V::sql_type(),
                apply,
            },
        });
        let index = self.registrations.len() - 1;
        MemberHint {
            registration: &mut self.registrations[index],
        }
    }
}

/// Cached member metadata for record type `T`
pub struct TypeProfile<T> {
    fields_by_name: HashMap<String, Arc<Member<T>>>,
    fields_by_alias: HashMap<String, Arc<Member<T>>>,
    setters_by_name: HashMap<String, Arc<Member<T>>>,
    setters_by_alias: HashMap<String, Arc<Member<T>>>,
}

type ProfileCache = RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>;

static PROFILES: OnceLock<ProfileCache> = OnceLock::new();

impl<T: Record> TypeProfile<T> {
    /// Profile for `T`, built on first request
    ///
    /// Every call for the same type returns the same instance, including
    /// racing first calls from several threads.
    pub fn get() -> Arc<Self> {
        let cache = PROFILES.get_or_init(Default::default);
        let key = TypeId::of::<T>();

        if let Some(existing) = cache.read().get(&key) {
            if let Ok(profile) = Arc::clone(existing).downcast::<Self>() {
                return profile;
            }
        }

        // Built outside the lock: `describe` may ask for nested profiles.
        let built: Arc<dyn Any + Send + Sync> = Arc::new(Self::build());
        let published = Arc::clone(cache.write().entry(key).or_insert(built));
        published
            .downcast::<Self>()
            .unwrap_or_else(|_| Arc::new(Self::build()))
    }

    fn build() -> Self {
        let mut builder = ProfileBuilder::new();
        T::describe(&mut builder);

        let mut profile = Self {
            fields_by_name: HashMap::new(),
            fields_by_alias: HashMap::new(),
            setters_by_name: HashMap::new(),
            setters_by_alias: HashMap::new(),
        };
        for registration in builder.registrations {
            if registration.ignored {
                continue;
            }
            let member = Arc::new(registration.member);
            let (by_name, by_alias) = match registration.kind {
                MemberKind::Field => (&mut profile.fields_by_name, &mut profile.fields_by_alias),
                MemberKind::Setter => (&mut profile.setters_by_name, &mut profile.setters_by_alias),
            };
            if let Some(alias) = registration.alias {
                by_alias.insert(alias, Arc::clone(&member));
            }
            by_name.insert(member.name.clone(), member);
        }
        profile
    }

    /// Member that a column named `column` resolves to
    ///
    /// Lookup order: field alias, field name, setter alias, setter name.
    pub fn resolve(&self, column: &str) -> Option<&Member<T>> {
        self.fields_by_alias
            .get(column)
            .or_else(|| self.fields_by_name.get(column))
            .or_else(|| self.setters_by_alias.get(column))
            .or_else(|| self.setters_by_name.get(column))
            .map(Arc::as_ref)
    }

    /// Convert and assign one column to the matching member
    ///
    /// Returns `false` when no member matches; such columns are ignored.
    ///
    /// # Errors
    ///
    /// Returns the conversion error if the value cannot become the member's type.
    pub fn apply(&self, record: &mut T, column: &str, value: SqlValue) -> Result<bool> {
        match self.resolve(column) {
            Some(member) => {
                (member.apply)(record, column, value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Build a fresh record from named values
    ///
    /// # Errors
    ///
    /// Fails on the first value that cannot be converted.
    pub fn populate<I>(&self, entries: I) -> Result<T>
    where
        I: IntoIterator<Item = (String, SqlValue)>,
    {
        let mut record = T::default();
        for (column, value) in entries {
            self.apply(&mut record, &column, value)?;
        }
        Ok(record)
    }

    /// Number of distinct settable members
    pub fn member_count(&self) -> usize {
        self.fields_by_name.len() + self.setters_by_name.len()
    }
}
