// src/generation/generator.rs
//! Proxy generator facade
//!
//! Validates a generation request, computes its shape, asks the scope for
//! the (possibly cached) implementation and instantiates it. All validation
//! happens here, before anything is cached.

use crate::contract::descriptor::ContractDescriptor;
use crate::contract::signature::{ensure_accessible, ensure_closed};
use crate::contract::types::TypeRef;
use crate::generation::cache::ProxyScope;
use crate::generation::emitter::{emit, EmitRequest, Implementation};
use crate::generation::mixin::MixinRegistry;
use crate::generation::options::GenerationOptions;
use crate::generation::shape::{ProxyKind, ProxyShape};
use crate::interception::interceptor::Interceptor;
use crate::interception::value::Value;
use crate::proxy::instance::ProxyInstance;
use crate::proxy::target::Target;
use crate::utils::config::InterposeConfig;
use crate::utils::errors::{ProxyError, Result};
use std::sync::Arc;
use tracing::debug;

/// Everything that determines one generated implementation
#[derive(Clone)]
pub struct GenerationRequest {
    pub kind: ProxyKind,
    pub contract: Arc<ContractDescriptor>,
    pub additional: Vec<Arc<ContractDescriptor>>,
    pub options: GenerationOptions,

    /// Target supplied with the request; only its type and capabilities matter here
    pub target: Option<Arc<dyn Target>>,
}

impl GenerationRequest {
    pub fn new(kind: ProxyKind, contract: Arc<ContractDescriptor>) -> Self {
        Self {
            kind,
            contract,
            additional: Vec::new(),
            options: GenerationOptions::default(),
            target: None,
        }
    }

    pub fn with_additional(mut self, capabilities: &[Arc<ContractDescriptor>]) -> Self {
        self.additional.extend(capabilities.iter().cloned());
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_target(mut self, target: Arc<dyn Target>) -> Self {
        self.target = Some(target);
        self
    }
}

/// Creates proxies, sharing implementations through a [`ProxyScope`]
#[derive(Clone)]
pub struct ProxyGenerator {
    scope: Arc<ProxyScope>,
}

impl ProxyGenerator {
    /// Generator with a private scope and default configuration
    pub fn new() -> Self {
        Self::with_scope(Arc::new(ProxyScope::new()))
    }

    pub fn with_config(config: InterposeConfig) -> Self {
        Self::with_scope(Arc::new(ProxyScope::with_config(config)))
    }

    pub fn with_scope(scope: Arc<ProxyScope>) -> Self {
        Self { scope }
    }

    pub fn scope(&self) -> &Arc<ProxyScope> {
        &self.scope
    }

    /// Validate `request` and return its implementation, building it on a cache miss
    pub fn build_implementation(&self, request: &GenerationRequest) -> Result<Arc<Implementation>> {
        self.validate(request)?;

        let contract = &request.contract;
        let mixins = MixinRegistry::new(&request.options.mixins, Some(contract.as_ref()))?;
        for entry in mixins.entries() {
            self.validate_capability(&entry.capability)?;
        }

        let target_type = match request.kind {
            ProxyKind::InterfaceWithTarget | ProxyKind::ClassWithTarget => request
                .target
                .as_ref()
                .map(|t| t.type_info().clone()),
            _ => None,
        };
        let additional: Vec<TypeRef> = request
            .additional
            .iter()
            .map(|a| a.type_ref.clone())
            .collect();
        let mut shape = ProxyShape::new(
            request.kind,
            contract.type_ref.clone(),
            target_type,
            &additional,
            &request.options,
            &mixins,
        );
        if shape.target_type.is_some() {
            if let Some(target) = &request.target {
                shape = shape.with_target_capabilities(target.as_ref());
            }
        }
        debug!("Requesting implementation for {}", shape);

        self.scope.get_or_build(&shape, |id, name| {
            emit(EmitRequest {
                id,
                name,
                shape: shape.clone(),
                contract,
                additional: &request.additional,
                mixins: &mixins,
                options: &request.options,
                target: request.target.as_ref(),
            })
        })
    }

    fn validate(&self, request: &GenerationRequest) -> Result<()> {
        let contract = &request.contract;
        ensure_closed(contract)?;
        ensure_accessible(&contract.type_ref, self.allow_internal())?;

        if request.kind.is_class() {
            if !contract.is_class() {
                return Err(ProxyError::InvalidContract {
                    type_name: contract.type_ref.to_string(),
                    reason: "class proxies require a class type".to_string(),
                });
            }
            if contract.type_ref.is_sealed() {
                return Err(ProxyError::InvalidContract {
                    type_name: contract.type_ref.to_string(),
                    reason: "sealed classes cannot be proxied".to_string(),
                });
            }
        } else {
            if !contract.is_interface() {
                return Err(ProxyError::InvalidContract {
                    type_name: contract.type_ref.to_string(),
                    reason: "interface proxies require an interface type".to_string(),
                });
            }
            if let Some(base) = &request.options.base_type_for_contract_proxy {
                if !base.is_class() || base.type_ref.is_sealed() {
                    return Err(ProxyError::InvalidContract {
                        type_name: base.type_ref.to_string(),
                        reason: "the base type of an interface proxy must be an unsealed class"
                            .to_string(),
                    });
                }
                ensure_closed(base)?;
                ensure_accessible(&base.type_ref, self.allow_internal())?;
            }
        }

        for capability in &request.additional {
            self.validate_capability(capability)?;
        }

        match request.kind {
            ProxyKind::InterfaceWithTarget | ProxyKind::ClassWithTarget => {
                let target = request.target.as_ref().ok_or_else(|| {
                    ProxyError::InvalidTarget(format!(
                        "a target implementing {} is required",
                        contract.type_ref
                    ))
                })?;
                ensure_target_implements(target, contract)?;
            }
            ProxyKind::InterfaceWithTargetInterface => {
                if let Some(target) = &request.target {
                    ensure_target_implements(target, contract)?;
                }
            }
            ProxyKind::InterfaceWithoutTarget | ProxyKind::Class => {}
        }

        Ok(())
    }

    fn validate_capability(&self, capability: &ContractDescriptor) -> Result<()> {
        if !capability.is_interface() {
            return Err(ProxyError::InvalidContract {
                type_name: capability.type_ref.to_string(),
                reason: "additional capabilities must be interfaces".to_string(),
            });
        }
        ensure_closed(capability)?;
        ensure_accessible(&capability.type_ref, self.allow_internal())
    }

    fn allow_internal(&self) -> bool {
        self.scope.config().generator.allow_internal_types
    }

    /// Interface proxy whose interceptors supply every result
    pub fn create_interface_proxy_without_target(
        &self,
        contract: &Arc<ContractDescriptor>,
        additional: &[Arc<ContractDescriptor>],
        options: &GenerationOptions,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> Result<ProxyInstance> {
        let request = GenerationRequest::new(ProxyKind::InterfaceWithoutTarget, Arc::clone(contract))
            .with_additional(additional)
            .with_options(options.clone());
        self.instantiate(&request, interceptors, Vec::new())
    }

    /// Interface proxy forwarding to `target`
    pub fn create_interface_proxy_with_target(
        &self,
        contract: &Arc<ContractDescriptor>,
        additional: &[Arc<ContractDescriptor>],
        target: Arc<dyn Target>,
        options: &GenerationOptions,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> Result<ProxyInstance> {
        let request = GenerationRequest::new(ProxyKind::InterfaceWithTarget, Arc::clone(contract))
            .with_additional(additional)
            .with_options(options.clone())
            .with_target(target);
        self.instantiate(&request, interceptors, Vec::new())
    }

    /// Interface proxy whose target can be replaced, including mid-call
    pub fn create_interface_proxy_with_target_interface(
        &self,
        contract: &Arc<ContractDescriptor>,
        additional: &[Arc<ContractDescriptor>],
        target: Option<Arc<dyn Target>>,
        options: &GenerationOptions,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> Result<ProxyInstance> {
        let mut request =
            GenerationRequest::new(ProxyKind::InterfaceWithTargetInterface, Arc::clone(contract))
                .with_additional(additional)
                .with_options(options.clone());
        request.target = target;
        self.instantiate(&request, interceptors, Vec::new())
    }

    /// Subclass proxy; the base object is built from `constructor_args`
    pub fn create_class_proxy(
        &self,
        class: &Arc<ContractDescriptor>,
        additional: &[Arc<ContractDescriptor>],
        options: &GenerationOptions,
        constructor_args: Vec<Value>,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> Result<ProxyInstance> {
        let request = GenerationRequest::new(ProxyKind::Class, Arc::clone(class))
            .with_additional(additional)
            .with_options(options.clone());
        self.instantiate(&request, interceptors, constructor_args)
    }

    /// Subclass proxy forwarding to a separate instance of the class
    pub fn create_class_proxy_with_target(
        &self,
        class: &Arc<ContractDescriptor>,
        additional: &[Arc<ContractDescriptor>],
        target: Arc<dyn Target>,
        options: &GenerationOptions,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> Result<ProxyInstance> {
        let request = GenerationRequest::new(ProxyKind::ClassWithTarget, Arc::clone(class))
            .with_additional(additional)
            .with_options(options.clone())
            .with_target(target);
        self.instantiate(&request, interceptors, Vec::new())
    }

    fn instantiate(
        &self,
        request: &GenerationRequest,
        interceptors: Vec<Arc<dyn Interceptor>>,
        constructor_args: Vec<Value>,
    ) -> Result<ProxyInstance> {
        let implementation = self.build_implementation(request)?;
        let mut builder = implementation
            .instantiate()
            .interceptors(interceptors)
            .mixins(request.options.mixins.clone())
            .selector(request.options.selector.clone())
            .constructor_args(constructor_args);
        if let Some(target) = &request.target {
            builder = builder.target(Arc::clone(target));
        }
        builder.build()
    }
}

impl Default for ProxyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_target_implements(target: &Arc<dyn Target>, contract: &ContractDescriptor) -> Result<()> {
    if target.implements(&contract.type_ref) {
        Ok(())
    } else {
        Err(ProxyError::InvalidTarget(format!(
            "{} does not implement {}",
            target.type_info(),
            contract.type_ref
        )))
    }
}
