mod properties;
mod reconcile;
mod registry;
mod scenarios;
