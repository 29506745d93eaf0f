// src/generation/options.rs
//! Generation options

use crate::contract::descriptor::ContractDescriptor;
use crate::generation::hook::{AllMethodsHook, GenerationHook};
use crate::generation::selector::InterceptorSelector;
use crate::interception::value::Value;
use crate::proxy::target::{DelegateTarget, Target};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Attribute replicated onto a generated implementation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeInfo {
    pub name: String,
    pub args: Vec<String>,
}

impl AttributeInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Options shared by every proxy flavour
#[derive(Clone)]
pub struct GenerationOptions {
    /// Member filter; defaults to [`AllMethodsHook`]
    pub hook: Arc<dyn GenerationHook>,

    /// Per-call interceptor selection
    pub selector: Option<Arc<dyn InterceptorSelector>>,

    /// Mixin instances, in registration order
    pub mixins: Vec<Arc<dyn Target>>,

    /// Attributes copied onto the implementation
    pub additional_attributes: Vec<AttributeInfo>,

    /// Base class for interface proxies (must be an unsealed class)
    pub base_type_for_contract_proxy: Option<Arc<ContractDescriptor>>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            hook: Arc::new(AllMethodsHook),
            selector: None,
            mixins: Vec::new(),
            additional_attributes: Vec::new(),
            base_type_for_contract_proxy: None,
        }
    }
}

impl GenerationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook(mut self, hook: Arc<dyn GenerationHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn with_selector(mut self, selector: Arc<dyn InterceptorSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_mixin(mut self, mixin: Arc<dyn Target>) -> Self {
        self.mixins.push(mixin);
        self
    }

    /// Mix in a delegate instance; the proxy gains its `Invoke` member
    pub fn with_delegate_mixin<F>(self, delegate_type: Arc<ContractDescriptor>, body: F) -> Self
    where
        F: Fn(&mut [Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.with_mixin(DelegateTarget::delegate(delegate_type, body).shared())
    }

    /// Mix in a delegate type without an implementation
    pub fn with_delegate_type_mixin(self, delegate_type: Arc<ContractDescriptor>) -> Self {
        self.with_mixin(DelegateTarget::delegate_type(delegate_type).shared())
    }

    pub fn with_attribute(mut self, attribute: AttributeInfo) -> Self {
        self.additional_attributes.push(attribute);
        self
    }

    pub fn with_base_type(mut self, base: Arc<ContractDescriptor>) -> Self {
        self.base_type_for_contract_proxy = Some(base);
        self
    }
}

impl fmt::Debug for GenerationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationOptions")
            .field("hook_key", &self.hook.equality_key())
            .field("selector", &self.selector.is_some())
            .field("mixins", &self.mixins.len())
            .field("additional_attributes", &self.additional_attributes)
            .field(
                "base_type_for_contract_proxy",
                &self
                    .base_type_for_contract_proxy
                    .as_ref()
                    .map(|b| b.type_ref.to_string()),
            )
            .finish()
    }
}
