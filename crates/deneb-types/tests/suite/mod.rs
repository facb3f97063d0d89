mod seed_scenarios;
mod unchecked_varargs;
