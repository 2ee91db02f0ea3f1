mod heart;
mod predictions;
mod sensor;
mod status;
mod steps;
