mod trip;
