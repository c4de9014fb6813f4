mod engine;
pub mod policy;
mod solver;
mod types;

pub use engine::{inflate, project, project_provision, run_plan, simulate_depletion};
pub use solver::{blended_return, initial_withdrawal, solve_additional_savings, solve_capital};
pub use types::{
    CapitalGap, CapitalPlan, DepletionOutcome, DepletionSimulation, DepletionYear, DrawdownPlan,
    PlanStrategy, Provision, ProvisionProjection, ProvisionType, RetirementPlanInputs,
    RetirementPlanResult,
};
